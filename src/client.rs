//! IMAP implementation of the mail transport seam.
//!
//! [`ImapConnector`] resolves the address's provider, opens TLS to port 993
//! and logs in; the resulting [`ImapMailbox`] enumerates a folder with
//! `UID SEARCH ALL` and fetches one message at a time. Every protocol step is
//! bounded by the configured [`TimeoutConfig`].
//!
//! # Example
//!
//! ```no_run
//! use mail_ingest::{ImapConnector, IngestConfig, MailConnector, MailSession};
//! use secrecy::SecretString;
//!
//! # async fn example() -> mail_ingest::Result<()> {
//! let connector = ImapConnector::new(&IngestConfig::default());
//! let secret = SecretString::from("app-password".to_string());
//!
//! let mut mailbox = connector.open("user@gmail.com", &secret).await?;
//! let ids = mailbox.list_all("INBOX").await?;
//! println!("{} messages", ids.len());
//! mailbox.logout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{IngestConfig, TimeoutConfig};
use crate::connection;
use crate::error::{Error, Result};
use crate::known_servers::ServerRegistry;
use crate::mailbox::{MailConnector, MailSession, MessageId, RawMessage};
use crate::session::{self, AuthConfig, ImapSession};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

/// Opens authenticated IMAP sessions over TLS.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    registry: ServerRegistry,
    imap_port: u16,
    timeouts: TimeoutConfig,
}

impl ImapConnector {
    /// Creates a connector from the shared ingestion configuration.
    #[must_use]
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            registry: config.server_registry.clone(),
            imap_port: config.imap_port,
            timeouts: config.timeouts.clone(),
        }
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    type Session = ImapMailbox;

    #[instrument(name = "ImapConnector::open", skip_all, fields(email = %address))]
    async fn open(&self, address: &str, secret: &SecretString) -> Result<ImapMailbox> {
        let imap_host = self.registry.resolve(address)?.into_owned();
        let target_addr = format!("{imap_host}:{}", self.imap_port);
        let timeouts = &self.timeouts;

        debug!(imap_host = %imap_host, "Resolved IMAP host");

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&imap_host, &target_addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let auth_config = AuthConfig {
            email: address,
            password: secret.expose_secret(),
        };

        let session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, &auth_config),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            email: address.to_string(),
            timeout: timeouts.auth,
        })??;

        debug!("Authenticated");

        Ok(ImapMailbox {
            session: Box::new(session),
            imap_host,
            timeouts: self.timeouts.clone(),
        })
    }
}

/// An authenticated IMAP session.
pub struct ImapMailbox {
    session: Box<ImapSession>,
    imap_host: String,
    timeouts: TimeoutConfig,
}

impl ImapMailbox {
    /// Returns the IMAP host this session is connected to.
    #[must_use]
    pub fn imap_host(&self) -> &str {
        &self.imap_host
    }
}

#[async_trait]
impl MailSession for ImapMailbox {
    #[instrument(name = "ImapMailbox::list_all", skip(self))]
    async fn list_all(&mut self, folder: &str) -> Result<Vec<MessageId>> {
        let timeouts = &self.timeouts;

        tokio::time::timeout(
            timeouts.select,
            session::select_mailbox(&mut self.session, folder),
        )
        .await
        .map_err(|_| Error::SelectTimeout {
            mailbox: folder.to_string(),
            timeout: timeouts.select,
        })??;

        let uids = tokio::time::timeout(
            timeouts.search,
            session::search_all_uids(&mut self.session),
        )
        .await
        .map_err(|_| Error::SearchTimeout {
            timeout: timeouts.search,
        })??;

        Ok(uids.into_iter().map(MessageId).collect())
    }

    async fn fetch(&mut self, id: MessageId) -> Result<RawMessage> {
        let timeout = self.timeouts.fetch;

        let payload = tokio::time::timeout(
            timeout,
            session::fetch_message_body(&mut self.session, id.0),
        )
        .await
        .map_err(|_| Error::FetchTimeout { uid: id.0, timeout })??;

        Ok(RawMessage { id, payload })
    }

    async fn logout(&mut self) -> Result<()> {
        let timeout = self.timeouts.logout;

        tokio::time::timeout(timeout, session::logout(&mut self.session))
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
    }
}

impl std::fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("imap_host", &self.imap_host)
            .finish_non_exhaustive()
    }
}
