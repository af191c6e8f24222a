//! One-shot ingestion of a mailbox into the record store.
//!
//! [`Ingestor::run`] connects, enumerates the configured folder once and
//! processes every message strictly in order: fetch, parse, duplicate check,
//! insert. Observers of the account's [`ProgressGroup`] see a
//! [`ProgressEvent::NewRecord`] for every stored message, a
//! [`ProgressEvent::Progress`] for every processed one, and at most one
//! [`ProgressEvent::Error`] when the run fails. The first failure ends the
//! run; nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use mail_ingest::credentials::AccountId;
//! use mail_ingest::ingest::{AccountRef, Ingestor};
//! use mail_ingest::store::MemoryRecordStore;
//! use mail_ingest::{ImapConnector, IngestConfig, ProgressPublisher};
//! use secrecy::SecretString;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = IngestConfig::default();
//! let ingestor = Ingestor::new(
//!     ImapConnector::new(&config),
//!     Arc::new(MemoryRecordStore::new()),
//!     Arc::new(ProgressPublisher::new(config.channel_capacity)),
//!     config,
//! );
//!
//! let account = AccountRef { id: AccountId(1), email: "user@gmail.com" };
//! let mut events = ingestor.subscribe(account.id);
//!
//! let report = ingestor
//!     .run(account, &SecretString::from("app-password".to_string()))
//!     .await;
//! println!("stored {} of {}", report.persisted, report.total);
//! # drop(events.drain());
//! # }
//! ```

use crate::config::IngestConfig;
use crate::credentials::{Account, AccountId};
use crate::error::{Error, ErrorCategory, Result};
use crate::events::{ProgressEvent, RecordSummary};
use crate::mailbox::{MailConnector, MailSession, SessionGuard};
use crate::parser;
use crate::publisher::{ProgressGroup, ProgressPublisher, Subscription};
use crate::store::{DedupKey, RecordStore};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The account a run ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRef<'a> {
    /// Account identity, used for dedup scoping and the progress group.
    pub id: AccountId,
    /// Mailbox address, used to resolve the server and to log in.
    pub email: &'a str,
}

impl<'a> From<&'a Account> for AccountRef<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            id: account.id,
            email: &account.email,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every enumerated message was processed.
    Completed,
    /// The run stopped at the first failure.
    Failed {
        /// Failure class.
        category: ErrorCategory,
        /// The text published in the error event.
        detail: String,
    },
}

/// Counters and outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Messages found in the folder.
    pub total: usize,
    /// Messages fully handled, stored or skipped.
    pub processed: usize,
    /// Messages stored as new records.
    pub persisted: usize,
    /// Messages skipped as duplicates.
    pub skipped: usize,
    /// Terminal state.
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new() -> Self {
        Self {
            total: 0,
            processed: 0,
            persisted: 0,
            skipped: 0,
            outcome: RunOutcome::Completed,
        }
    }

    /// Whether the run processed every message.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Drives ingestion runs against a connector and a record store.
#[derive(Debug)]
pub struct Ingestor<C, R> {
    connector: C,
    store: Arc<R>,
    publisher: Arc<ProgressPublisher>,
    config: IngestConfig,
}

impl<C, R> Ingestor<C, R>
where
    C: MailConnector,
    R: RecordStore,
{
    /// Creates an ingestor.
    #[must_use]
    pub fn new(
        connector: C,
        store: Arc<R>,
        publisher: Arc<ProgressPublisher>,
        config: IngestConfig,
    ) -> Self {
        Self {
            connector,
            store,
            publisher,
            config,
        }
    }

    /// The group carrying events for `account`.
    #[must_use]
    pub fn group_for(&self, account: AccountId) -> ProgressGroup {
        ProgressGroup::for_account(&self.config.group_prefix, account)
    }

    /// Subscribes to the events of `account`.
    #[must_use]
    pub fn subscribe(&self, account: AccountId) -> Subscription {
        self.publisher.subscribe(&self.group_for(account))
    }

    /// The shared publisher.
    #[must_use]
    pub fn publisher(&self) -> &Arc<ProgressPublisher> {
        &self.publisher
    }

    /// The record store.
    #[must_use]
    pub fn store(&self) -> &Arc<R> {
        &self.store
    }

    /// Ingests every message of the configured folder.
    ///
    /// Never fails: a failure is published as one error event and reported
    /// in [`RunReport::outcome`]. Once a session is open it is logged out
    /// exactly once, whatever the outcome.
    #[instrument(
        name = "Ingestor::run",
        skip_all,
        fields(account_id = %account.id, email = %account.email)
    )]
    pub async fn run(&self, account: AccountRef<'_>, secret: &SecretString) -> RunReport {
        let group = self.group_for(account.id);
        let mut report = RunReport::new();

        info!(folder = %self.config.folder, "Ingestion run started");

        let session = match self.connector.open(account.email, secret).await {
            Ok(session) => session,
            Err(e) => {
                self.fail(&group, &mut report, &e);
                return report;
            }
        };

        let mut guard = SessionGuard::new(session, self.config.timeouts.logout);

        if let Err(e) = self
            .drive(guard.session(), account.id, &group, &mut report)
            .await
        {
            self.fail(&group, &mut report, &e);
        }

        guard.close().await;

        info!(
            total = report.total,
            persisted = report.persisted,
            skipped = report.skipped,
            completed = report.is_completed(),
            "Ingestion run finished"
        );

        report
    }

    async fn drive(
        &self,
        session: &mut C::Session,
        account: AccountId,
        group: &ProgressGroup,
        report: &mut RunReport,
    ) -> Result<()> {
        let ids = session.list_all(&self.config.folder).await?;
        report.total = ids.len();

        debug!(total = report.total, "Folder enumerated");

        for id in ids {
            let raw = session.fetch(id).await?;
            let message = parser::parse(&raw.payload)?;
            let key = DedupKey::for_message(account, &message);

            if self.store.exists(&key).await? {
                debug!(uid = %id, "Duplicate skipped");
                report.skipped += 1;
            } else {
                let record_id = self.store.insert(account, &message).await?;
                debug!(uid = %id, record_id = %record_id, "Record stored");
                report.persisted += 1;

                let summary = RecordSummary::new(record_id, &message, self.config.preview_chars);
                self.publisher
                    .publish(group, ProgressEvent::NewRecord(summary));
            }

            report.processed += 1;
            self.publisher.publish(
                group,
                ProgressEvent::progress(report.processed, report.total),
            );

            if !self.config.pacing.is_zero() {
                tokio::time::sleep(self.config.pacing).await;
            }
        }

        Ok(())
    }

    fn fail(&self, group: &ProgressGroup, report: &mut RunReport, error: &Error) {
        let detail = error_detail(error);
        warn!(category = %error.category(), detail = %detail, "Ingestion run failed");

        self.publisher.publish(group, ProgressEvent::error(&*detail));
        report.outcome = RunOutcome::Failed {
            category: error.category(),
            detail,
        };
    }
}

/// Text of the error event for a failed run.
#[must_use]
pub fn error_detail(error: &Error) -> String {
    if let Error::UnsupportedProvider { domain } = error {
        return format!("Unsupported email provider: {domain}");
    }

    let cause = describe(error);
    match error.category() {
        ErrorCategory::Connection => format!("Connection failed: {cause}"),
        ErrorCategory::Auth => format!("Authentication failed: {cause}"),
        _ => format!("Failed to fetch emails: {cause}"),
    }
}

/// The error followed by its source chain.
fn describe(error: &Error) -> String {
    let mut text = error.to_string();
    let mut source = std::error::Error::source(error);

    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_detail_prefixes() {
        let unsupported = Error::UnsupportedProvider {
            domain: "example.com".into(),
        };
        assert_eq!(
            error_detail(&unsupported),
            "Unsupported email provider: example.com"
        );

        let timeout = Error::ConnectTimeout {
            target: "imap.gmail.com:993".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(error_detail(&timeout).starts_with("Connection failed: "));

        let auth = Error::AuthTimeout {
            email: "user@gmail.com".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(error_detail(&auth).starts_with("Authentication failed: "));

        let other = Error::MissingBody { uid: 3 };
        assert_eq!(
            error_detail(&other),
            "Failed to fetch emails: server returned no body for UID 3"
        );
    }

    #[test]
    fn test_error_detail_includes_source_chain() {
        let err = Error::TcpConnect {
            target: "imap.mail.ru:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };

        let detail = error_detail(&err);
        assert!(detail.starts_with("Connection failed: "));
        assert!(detail.ends_with(": refused"), "{detail}");
    }

    #[test]
    fn test_account_ref_from_account() {
        let account = Account {
            id: AccountId(5),
            email: "user@bk.ru".into(),
            encrypted_secret: String::new(),
        };

        let account_ref = AccountRef::from(&account);

        assert_eq!(account_ref.id, AccountId(5));
        assert_eq!(account_ref.email, "user@bk.ru");
    }
}
