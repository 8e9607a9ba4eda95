use crate::error::ConnectionError;

/// Header block of one message, keyed by its 1-based sequence number.
#[derive(Debug, Clone)]
pub struct MessageHeaders {
    pub seq: u32,
    pub raw: Vec<u8>,
}

/// An authenticated session with the mailbox opened read-only.
pub trait MailboxSession {
    /// Returns headers for sequence numbers `first..=last`. Messages past the
    /// end of the mailbox are simply absent from the result.
    fn fetch_headers(&mut self, first: u32, last: u32)
    -> Result<Vec<MessageHeaders>, ConnectionError>;

    fn logout(&mut self) -> Result<(), ConnectionError>;
}

/// Opens new sessions; one call is one connect + login + read-only select.
pub trait Connector {
    type Session: MailboxSession;

    fn connect(&self) -> Result<Self::Session, ConnectionError>;
}

/// Owns at most one live session and reconnects on demand.
pub struct SessionManager<C: Connector> {
    connector: C,
    session: Option<C::Session>,
    connects: u32,
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: None,
            connects: 0,
        }
    }

    /// Returns the live session, connecting first if there is none.
    pub fn ensure_session(&mut self) -> Result<&mut C::Session, ConnectionError> {
        let session = match self.session.take() {
            Some(s) => s,
            None => {
                self.connects += 1;
                log::info!("opening mailbox session (connect #{})", self.connects);
                self.connector.connect()?
            }
        };
        Ok(self.session.insert(session))
    }

    /// Drops the current session so the next `ensure_session` reconnects.
    pub fn invalidate(&mut self) {
        if let Some(mut s) = self.session.take() {
            if let Err(e) = s.logout() {
                log::debug!("logout of discarded session failed: {e}");
            }
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Number of connection attempts made so far.
    pub fn connects(&self) -> u32 {
        self.connects
    }
}
