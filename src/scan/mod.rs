use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::domain::address::AddressSet;
use crate::domain::checkpoint::Checkpoint;
use crate::error::{ConnectionError, ScanError};
use crate::mail::address_list::extract_addresses;
use crate::mail::session::{Connector, MailboxSession, MessageHeaders, SessionManager};
use crate::store::repo::CheckpointRepository;

pub const DEFAULT_WINDOW_SIZE: u32 = 200;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub window_size: u32,
    /// Total tries per window, the first one included.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Fetching,
    Extracting,
    Checkpointing,
    Done,
    Failed,
}

/// Reported after every persisted window.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub consumed: u32,
    pub window_messages: usize,
    pub addresses: usize,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub consumed: u32,
    pub addresses: usize,
    pub windows: u32,
    pub path: PathBuf,
}

/// Result of fetching one window with the retry budget applied.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(Vec<MessageHeaders>),
    Exhausted {
        attempts: u32,
        last_error: ConnectionError,
    },
}

pub struct ScanEngine<'a, C: Connector> {
    sessions: SessionManager<C>,
    store: &'a mut dyn CheckpointRepository,
    options: ScanOptions,
    state: ScanState,
    checkpoint: Checkpoint,
}

impl<'a, C: Connector> ScanEngine<'a, C> {
    pub fn new(
        sessions: SessionManager<C>,
        store: &'a mut dyn CheckpointRepository,
        options: ScanOptions,
    ) -> Self {
        Self {
            sessions,
            store,
            options,
            state: ScanState::Idle,
            checkpoint: Checkpoint::default(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Last checkpoint that was loaded or persisted.
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn sessions(&self) -> &SessionManager<C> {
        &self.sessions
    }

    /// Scans from the latest checkpoint until a window comes back empty.
    ///
    /// On error everything up to the last persisted checkpoint stays on
    /// disk, and a new run resumes from there.
    pub fn run<F>(&mut self, mut on_progress: F) -> Result<ScanReport, ScanError>
    where
        F: FnMut(&ScanProgress),
    {
        let result = self.run_inner(&mut on_progress);
        self.state = if result.is_ok() {
            ScanState::Done
        } else {
            ScanState::Failed
        };
        result
    }

    fn run_inner(
        &mut self,
        on_progress: &mut dyn FnMut(&ScanProgress),
    ) -> Result<ScanReport, ScanError> {
        self.checkpoint = self.store.discover_latest()?;
        let mut windows = 0;

        loop {
            self.state = ScanState::Fetching;
            let first = self.checkpoint.consumed().saturating_add(1);
            let last = self
                .checkpoint
                .consumed()
                .saturating_add(self.options.window_size.max(1));

            let messages = match self.fetch_window(first, last) {
                FetchOutcome::Fetched(m) => m,
                FetchOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    log::error!("giving up on messages {first}:{last}: {last_error}");
                    self.sessions.invalidate();
                    return Err(ScanError::RetriesExhausted {
                        first,
                        last,
                        attempts,
                        source: last_error,
                    });
                }
            };

            self.state = ScanState::Extracting;
            let (batch, highest) = extract_window(&messages);
            let consumed = self.checkpoint.consumed();
            let Some(highest) = highest.filter(|&h| h > consumed) else {
                if !messages.is_empty() {
                    log::warn!(
                        "window {first}:{last} returned only already-consumed messages; treating mailbox as exhausted"
                    );
                }
                return self.finish(windows);
            };

            self.state = ScanState::Checkpointing;
            let mut next = self.checkpoint.clone();
            next.advance(highest, &batch);
            let path = self.store.persist(&next).map_err(ScanError::Persist)?;
            self.checkpoint = next;
            windows += 1;

            log::info!(
                "checkpoint {} at message {} ({} addresses)",
                path.display(),
                self.checkpoint.consumed(),
                self.checkpoint.addresses().len()
            );
            on_progress(&ScanProgress {
                consumed: self.checkpoint.consumed(),
                window_messages: messages.len(),
                addresses: self.checkpoint.addresses().len(),
            });
        }
    }

    fn finish(&mut self, windows: u32) -> Result<ScanReport, ScanError> {
        let path = self
            .store
            .compact(&self.checkpoint)
            .map_err(ScanError::Persist)?;
        self.sessions.invalidate();

        Ok(ScanReport {
            consumed: self.checkpoint.consumed(),
            addresses: self.checkpoint.addresses().len(),
            windows,
            path,
        })
    }

    /// Fetches `first..=last`, reconnecting after every failure, for at most
    /// `max_attempts` tries.
    pub fn fetch_window(&mut self, first: u32, last: u32) -> FetchOutcome {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = self
                .sessions
                .ensure_session()
                .and_then(|s| s.fetch_headers(first, last));

            match result {
                Ok(messages) => return FetchOutcome::Fetched(messages),
                Err(e) if attempt >= max_attempts => {
                    return FetchOutcome::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    };
                }
                Err(e) => {
                    log::warn!(
                        "attempt {attempt}/{max_attempts} for messages {first}:{last} failed: {e}"
                    );
                    self.sessions.invalidate();
                    if !self.options.retry_delay.is_zero() {
                        thread::sleep(self.options.retry_delay);
                    }
                }
            }
        }
    }
}

/// Addresses found in a window plus the highest sequence number seen.
pub fn extract_window(messages: &[MessageHeaders]) -> (AddressSet, Option<u32>) {
    let mut batch = AddressSet::new();
    let mut highest = None;
    for m in messages {
        extract_addresses(&m.raw, &mut batch);
        highest = highest.max(Some(m.seq));
    }
    (batch, highest)
}
