use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no config dir available")]
    NoConfigDir,
    #[error("created template config at {0}; edit it and run again")]
    TemplateCreated(PathBuf),
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("config field `{0}` is missing or empty")]
    Missing(&'static str),
}

/// Anything that went wrong talking to the mail server: DNS, TCP, TLS,
/// authentication, mailbox selection or fetch.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("IMAP {stage} failed: {message}")]
    Imap {
        stage: &'static str,
        message: String,
    },
}

impl ConnectionError {
    pub fn imap(stage: &'static str, err: impl std::fmt::Display) -> Self {
        ConnectionError::Imap {
            stage,
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error(
        "found compaction backup {backup} without its checkpoint; rename it to {restore_to} and run again"
    )]
    OrphanedBackup { backup: PathBuf, restore_to: PathBuf },
    #[error("checkpoint I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    /// Discovery failed; no progress was made in this run.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    /// Writing a checkpoint failed; the previous one is still on disk.
    #[error("saving checkpoint failed: {0}")]
    Persist(#[source] CheckpointError),
    #[error("fetching messages {first}:{last} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        first: u32,
        last: u32,
        attempts: u32,
        source: ConnectionError,
    },
}

impl ScanError {
    /// Whether running again resumes from a checkpoint this run left behind.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            ScanError::RetriesExhausted { .. } | ScanError::Persist(_)
        )
    }
}
