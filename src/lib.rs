//! # mail-ingest
//!
//! Async ingestion of IMAP mailboxes into a deduplicated record store, with
//! live progress fan-out to observers.
//!
//! A run resolves the account's provider from its address, logs in over TLS,
//! enumerates a folder once and processes every message in order:
//!
//! - the raw message is parsed into subject, sender, send date, body text and
//!   attachment names ([`parser`]), with key/value data recovered from HTML
//!   tables ([`tables`]);
//! - messages already stored for the account are skipped ([`store`]);
//! - new ones are persisted and announced, and every processed message
//!   advances a percentage ([`events`], [`publisher`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use mail_ingest::credentials::AccountId;
//! use mail_ingest::ingest::{AccountRef, Ingestor};
//! use mail_ingest::store::SqliteRecordStore;
//! use mail_ingest::{ImapConnector, IngestConfig, ProgressEvent, ProgressPublisher};
//! use secrecy::SecretString;
//! use std::sync::Arc;
//!
//! # async fn example() -> mail_ingest::Result<()> {
//! let config = IngestConfig::builder().folder("INBOX").build()?;
//! let ingestor = Arc::new(Ingestor::new(
//!     ImapConnector::new(&config),
//!     Arc::new(SqliteRecordStore::open("mail.sqlite")?),
//!     Arc::new(ProgressPublisher::new(config.channel_capacity)),
//!     config,
//! ));
//!
//! let mut events = ingestor.subscribe(AccountId(1));
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         if let ProgressEvent::Progress { percent, .. } = event {
//!             println!("{percent}%");
//!         }
//!     }
//! });
//!
//! let secret = SecretString::from("app-password".to_string());
//! let report = ingestor
//!     .run(AccountRef { id: AccountId(1), email: "user@yandex.ru" }, &secret)
//!     .await;
//! println!("{} new, {} already stored", report.persisted, report.skipped);
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! Only addresses whose domain ends in a known suffix are accepted. The
//! table is data and can be extended:
//!
//! ```
//! use mail_ingest::ServerRegistry;
//!
//! let mut registry = ServerRegistry::with_defaults();
//! registry.register("corp.example", "imap.corp.example");
//!
//! assert_eq!(registry.resolve("me@gmail.com").unwrap(), "imap.gmail.com");
//! assert_eq!(registry.resolve("me@corp.example").unwrap(), "imap.corp.example");
//! assert!(registry.resolve("me@example.org").is_err());
//! ```
//!
//! ## Error Handling
//!
//! All errors carry an [`ErrorCategory`]; a failed run reports one error
//! event worded by category.
//!
//! ```
//! use mail_ingest::{Error, ErrorCategory};
//!
//! let err = Error::UnsupportedProvider { domain: "example.org".into() };
//! assert_eq!(err.category(), ErrorCategory::UnsupportedProvider);
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. Install a subscriber to see
//! the output.
//!
//! ### Span Naming Convention
//!
//! - `ImapConnector::open` - Provider resolution, TLS connect and login
//! - `ImapMailbox::list_all` - Folder selection and enumeration
//! - `Ingestor::run` - One ingestion run
//! - `Gateway::handle` - One observer command
//! - `session::authenticate` - IMAP authentication
//! - `connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `email` - Mailbox address
//! - `imap_host` - IMAP server hostname
//! - `account_id` - Account identity
//! - `uid` - Message UID

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ingest;
pub mod known_servers;
pub mod mailbox;
pub mod parser;
pub mod publisher;
pub mod store;
pub mod tables;

// Internal modules
mod client;
mod connection;
mod session;

// Re-exports for ergonomic API
pub use client::{ImapConnector, ImapMailbox};
pub use config::{IngestConfig, IngestConfigBuilder, TimeoutConfig};
pub use credentials::{AccountId, CredentialStore, MemoryCredentialStore};
pub use error::{Error, ErrorCategory, Result};
pub use events::{ProgressEvent, RecordSummary, WireEvent};
pub use gateway::{CloseCode, Gateway, GatewayReply};
pub use ingest::{AccountRef, Ingestor, RunOutcome, RunReport};
pub use known_servers::ServerRegistry;
pub use mailbox::{MailConnector, MailSession, MessageId, RawMessage, SessionGuard};
pub use parser::ParsedMessage;
pub use publisher::{ProgressGroup, ProgressPublisher, Subscription};
pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
