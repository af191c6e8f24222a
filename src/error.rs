//! Error types for the mail-ingest crate.
//!
//! Every error maps to an [`ErrorCategory`] via [`Error::category`]. The
//! category decides how a failure is worded when it is reported to observers:
//! transport and authentication failures get their own messages, everything
//! else during a run is an ingestion failure.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting a mailbox.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// The address belongs to a domain with no known IMAP server.
    #[error("unsupported email provider: {domain}")]
    UnsupportedProvider {
        /// The domain that matched no allow-list entry.
        domain: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Transport errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication errors
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {email}")]
    ImapLogin {
        /// The email address used for login.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {email} after {timeout:?}")]
    AuthTimeout {
        /// The email address used for authentication.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Mailbox protocol errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to select mailbox.
    #[error("failed to select mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Mailbox selection timeout.
    #[error("mailbox selection timeout for '{mailbox}' after {timeout:?}")]
    SelectTimeout {
        /// The mailbox name.
        mailbox: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// IMAP search failed.
    #[error("IMAP search failed")]
    ImapSearch {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// UID search timeout.
    #[error("UID search timeout after {timeout:?}")]
    SearchTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// IMAP fetch command failed.
    #[error("IMAP fetch failed for UID {uid}")]
    ImapFetch {
        /// The UID that failed.
        uid: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to read a message from the fetch stream.
    #[error("failed to read message UID {uid} from stream")]
    FetchMessage {
        /// The UID being read.
        uid: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Message fetch timeout.
    #[error("message fetch timeout for UID {uid} after {timeout:?}")]
    FetchTimeout {
        /// The UID being fetched.
        uid: u32,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Server answered a fetch without a message body.
    #[error("server returned no body for UID {uid}")]
    MissingBody {
        /// The UID that came back empty.
        uid: u32,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Logout timeout.
    #[error("logout timeout after {timeout:?}")]
    LogoutTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Message errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The raw message could not be parsed as MIME.
    #[error("failed to parse email")]
    ParseEmail {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// The message parsed but violates a requirement (e.g. no usable date).
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// What was wrong with the message.
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Collaborator errors
    // ─────────────────────────────────────────────────────────────────────────
    /// No account with the given id.
    #[error("account {account_id} not found")]
    AccountNotFound {
        /// The unknown account id.
        account_id: u64,
    },

    /// A stored credential could not be encrypted or decrypted.
    #[error("credential error: {message}")]
    Credential {
        /// Description of the failure.
        message: String,
    },

    /// The record store rejected an operation.
    #[error("record store {operation} failed")]
    Store {
        /// The store operation (`exists`, `insert`, ...).
        operation: &'static str,
        /// The underlying store error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other fault during ingestion.
    #[error("ingestion failed: {message}")]
    IngestionFailure {
        /// Description of the failure.
        message: String,
    },
}

impl Error {
    /// Returns the error category used for reporting.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. } | Error::InvalidConfig { .. } => {
                ErrorCategory::Configuration
            }

            Error::UnsupportedProvider { .. } => ErrorCategory::UnsupportedProvider,

            Error::InvalidDnsName { .. }
            | Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. } => ErrorCategory::Connection,

            // A login that dies on the wire never reached a verdict on the credentials.
            Error::ImapLogin { source, .. } => match source {
                async_imap::error::Error::Io(_) | async_imap::error::Error::ConnectionLost => {
                    ErrorCategory::Connection
                }
                _ => ErrorCategory::Auth,
            },
            Error::AuthTimeout { .. } => ErrorCategory::Auth,

            Error::ParseEmail { .. } | Error::MalformedMessage { .. } => {
                ErrorCategory::MalformedMessage
            }

            Error::AccountNotFound { .. } => ErrorCategory::NotFound,

            Error::Credential { .. } => ErrorCategory::Credential,

            Error::SelectMailbox { .. }
            | Error::SelectTimeout { .. }
            | Error::ImapSearch { .. }
            | Error::SearchTimeout { .. }
            | Error::ImapFetch { .. }
            | Error::FetchMessage { .. }
            | Error::FetchTimeout { .. }
            | Error::MissingBody { .. }
            | Error::ImapLogout { .. }
            | Error::LogoutTimeout { .. }
            | Error::Store { .. }
            | Error::IngestionFailure { .. } => ErrorCategory::IngestionFailure,
        }
    }

    /// Wraps a record store error.
    pub fn store<E>(operation: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Store {
            operation,
            source: Box::new(source),
        }
    }
}

/// Error categories, one per failure class observers are told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// The email domain is not on the provider allow-list.
    UnsupportedProvider,
    /// The mail server could not be reached.
    Connection,
    /// The mail server rejected the credentials.
    Auth,
    /// A message could not be parsed.
    MalformedMessage,
    /// The requested account does not exist.
    NotFound,
    /// A stored credential could not be decrypted.
    Credential,
    /// Any other failure while ingesting.
    IngestionFailure,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::UnsupportedProvider => write!(f, "unsupported_provider"),
            ErrorCategory::Connection => write!(f, "connection"),
            ErrorCategory::Auth => write!(f, "auth"),
            ErrorCategory::MalformedMessage => write!(f, "malformed_message"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Credential => write!(f, "credential"),
            ErrorCategory::IngestionFailure => write!(f, "ingestion_failure"),
        }
    }
}
