use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;

use crate::config::Config;
use crate::error::ConnectionError;
use crate::mail::session::{Connector, MailboxSession, MessageHeaders};

type TlsSession = imap::Session<TlsStream<TcpStream>>;

/// Connects over implicit TLS and logs in with username/password.
pub struct ImapClient {
    pub server: String,
    pub port: u16,
    pub user: String,
    password: String,
    pub mailbox: String,
}

impl ImapClient {
    pub fn new(
        server: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            user: user.into(),
            password: password.into(),
            mailbox: "INBOX".to_string(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let mut client = Self::new(&cfg.server, cfg.port, &cfg.username, &cfg.password);
        client.mailbox = cfg.mailbox.clone();
        client
    }

    fn connect_and_auth(&self) -> Result<TlsSession, ConnectionError> {
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| ConnectionError::Tls(e.to_string()))?;
        let client = imap::connect((self.server.as_str(), self.port), self.server.as_str(), &tls)
            .map_err(|e| ConnectionError::imap("connect", e))?;

        client
            .login(&self.user, &self.password)
            .map_err(|(e, _client)| ConnectionError::imap("login", e))
    }
}

impl Connector for ImapClient {
    type Session = ImapMailbox;

    fn connect(&self) -> Result<ImapMailbox, ConnectionError> {
        log::debug!("connecting to {}:{}", self.server, self.port);
        let mut session = self.connect_and_auth()?;

        // EXAMINE opens the mailbox read-only
        let mailbox = match session.examine(&self.mailbox) {
            Ok(m) => m,
            Err(e) => {
                let _ = session.logout();
                return Err(ConnectionError::imap("examine", e));
            }
        };
        log::info!("{} has {} messages", self.mailbox, mailbox.exists);

        Ok(ImapMailbox {
            session,
            exists: mailbox.exists,
        })
    }
}

/// A logged-in session with one mailbox examined.
pub struct ImapMailbox {
    session: TlsSession,
    exists: u32,
}

impl MailboxSession for ImapMailbox {
    fn fetch_headers(
        &mut self,
        first: u32,
        last: u32,
    ) -> Result<Vec<MessageHeaders>, ConnectionError> {
        // Servers reject sequence sets past EXISTS, so clamp locally.
        let last = last.min(self.exists);
        if first == 0 || first > last {
            return Ok(Vec::new());
        }

        let seq = format!("{first}:{last}");
        let fetches = self
            .session
            .fetch(seq.as_str(), "BODY.PEEK[HEADER]")
            .map_err(|e| ConnectionError::imap("fetch", e))?;

        let mut out = Vec::with_capacity(fetches.len());
        for f in fetches.iter() {
            match f.header() {
                Some(raw) => out.push(MessageHeaders {
                    seq: f.message,
                    raw: raw.to_vec(),
                }),
                None => {
                    log::warn!("message {} returned no header block", f.message);
                    out.push(MessageHeaders {
                        seq: f.message,
                        raw: Vec::new(),
                    });
                }
            }
        }
        Ok(out)
    }

    fn logout(&mut self) -> Result<(), ConnectionError> {
        self.session
            .logout()
            .map_err(|e| ConnectionError::imap("logout", e))
    }
}
