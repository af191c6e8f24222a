//! Command handling for observer connections.
//!
//! An observer sends `{"account_id": <id>}` to start a run for that account
//! and watches the account's progress group for events. [`Gateway::handle`]
//! returns the frames to send back and whether to close the connection; the
//! socket itself belongs to the embedding server.

use crate::credentials::{AccountId, CredentialStore};
use crate::error::Error;
use crate::events::WireEvent;
use crate::ingest::{AccountRef, Ingestor, RunOutcome, RunReport};
use crate::mailbox::MailConnector;
use crate::publisher::{ProgressGroup, Subscription};
use crate::store::RecordStore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Reply sent when the requested account does not exist.
pub const ACCOUNT_NOT_FOUND: &str = "Account not found.";

/// Inbound command frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Command {
    /// Account to ingest. Missing, null or zero starts nothing.
    #[serde(default)]
    pub account_id: Option<u64>,
}

/// WebSocket close codes the gateway asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// The server hit an unexpected condition (1011).
    InternalError,
}

impl CloseCode {
    /// Numeric code as sent on the wire.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            CloseCode::InternalError => 1011,
        }
    }
}

/// What to send back for one inbound frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayReply {
    /// Frames to send, in order.
    pub frames: Vec<WireEvent>,
    /// Close the connection after sending, with this code.
    pub close: Option<CloseCode>,
    /// Report of the run, when one was started.
    pub report: Option<RunReport>,
}

impl GatewayReply {
    fn error(detail: impl Into<String>) -> Self {
        Self {
            frames: vec![WireEvent::error(detail)],
            ..Self::default()
        }
    }

    fn fatal(detail: impl Into<String>) -> Self {
        Self {
            close: Some(CloseCode::InternalError),
            ..Self::error(detail)
        }
    }

    /// Encodes the frames as JSON text.
    ///
    /// # Errors
    ///
    /// Returns the first serializer error.
    pub fn encoded_frames(&self) -> serde_json::Result<Vec<String>> {
        self.frames.iter().map(WireEvent::to_json).collect()
    }
}

/// Turns observer commands into ingestion runs.
#[derive(Debug)]
pub struct Gateway<C, R, S> {
    ingestor: Ingestor<C, R>,
    credentials: Arc<S>,
}

impl<C, R, S> Gateway<C, R, S>
where
    C: MailConnector,
    R: RecordStore,
    S: CredentialStore,
{
    /// Creates a gateway over an ingestor and a credential store.
    #[must_use]
    pub fn new(ingestor: Ingestor<C, R>, credentials: Arc<S>) -> Self {
        Self {
            ingestor,
            credentials,
        }
    }

    /// The progress group an observer of `account` joins.
    #[must_use]
    pub fn group_for(&self, account: AccountId) -> ProgressGroup {
        self.ingestor.group_for(account)
    }

    /// Joins the progress group of `account`.
    #[must_use]
    pub fn subscribe(&self, account: AccountId) -> Subscription {
        self.ingestor.subscribe(account)
    }

    /// The underlying ingestor.
    #[must_use]
    pub fn ingestor(&self) -> &Ingestor<C, R> {
        &self.ingestor
    }

    /// Handles one inbound text frame.
    ///
    /// Run progress reaches observers through the publisher. A failed run is
    /// also answered directly with its error and a close.
    #[instrument(name = "Gateway::handle", skip_all)]
    pub async fn handle(&self, text: &str) -> GatewayReply {
        let command: Command = match serde_json::from_str(text) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Malformed command");
                return GatewayReply::fatal(format!("invalid command: {e}"));
            }
        };

        let Some(account_id) = command.account_id.filter(|id| *id != 0) else {
            debug!("Command without account id ignored");
            return GatewayReply::default();
        };

        self.start(AccountId(account_id)).await
    }

    #[instrument(name = "Gateway::start", skip(self), fields(account_id = %account_id))]
    async fn start(&self, account_id: AccountId) -> GatewayReply {
        let account = match self.credentials.get(account_id).await {
            Ok(account) => account,
            Err(Error::AccountNotFound { .. }) => {
                debug!("Account not found");
                return GatewayReply::error(ACCOUNT_NOT_FOUND);
            }
            Err(e) => {
                warn!(error = %e, "Account lookup failed");
                return GatewayReply::fatal(e.to_string());
            }
        };

        let secret = match self.credentials.decrypt(&account) {
            Ok(secret) => secret,
            Err(e) => {
                warn!(error = %e, "Stored password could not be decrypted");
                return GatewayReply::fatal(e.to_string());
            }
        };

        let report = self
            .ingestor
            .run(AccountRef::from(&account), &secret)
            .await;

        let reply = match &report.outcome {
            RunOutcome::Completed => GatewayReply::default(),
            RunOutcome::Failed { category, detail } => {
                warn!(%category, "Run failed, closing connection");
                GatewayReply::fatal(detail.clone())
            }
        };

        GatewayReply {
            report: Some(report),
            ..reply
        }
    }
}
