//! Configuration for mailbox ingestion.
//!
//! Use [`IngestConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use mail_ingest::IngestConfig;
//! use std::time::Duration;
//!
//! let config = IngestConfig::builder()
//!     .folder("INBOX")
//!     .pacing(Duration::ZERO)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.imap_port, 993);
//! ```

use crate::error::{Error, Result};
use crate::known_servers::ServerRegistry;
use crate::publisher::DEFAULT_GROUP_PREFIX;
use std::time::Duration;

/// Standard port for IMAP over implicit TLS.
pub const IMAPS_PORT: u16 = 993;

/// Default number of buffered events per progress group.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration shared by every ingestion run.
///
/// Create using [`IngestConfig::builder()`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Suffix table used to resolve an address to its IMAP host.
    pub server_registry: ServerRegistry,
    /// IMAP server port (default: 993 for IMAPS).
    pub imap_port: u16,
    /// Folder scanned on every run (default: `INBOX`).
    pub folder: String,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Delay between processed messages; zero disables pacing.
    pub pacing: Duration,
    /// Number of body characters in a new-record preview.
    pub preview_chars: usize,
    /// Buffered events per progress group before slow subscribers lag.
    pub channel_capacity: usize,
    /// Prefix of per-account progress group names.
    pub group_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            server_registry: ServerRegistry::with_defaults(),
            imap_port: IMAPS_PORT,
            folder: "INBOX".to_string(),
            timeouts: TimeoutConfig::default(),
            pacing: Duration::from_millis(100),
            preview_chars: 50,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            group_prefix: DEFAULT_GROUP_PREFIX.to_string(),
        }
    }
}

impl IngestConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }
}

/// Timeout configuration for IMAP operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a mailbox.
    pub select: Duration,
    /// Timeout for the UID search that enumerates the folder.
    pub search: Duration,
    /// Timeout for fetching one message.
    pub fetch: Duration,
    /// Timeout for logout operation.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            search: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    server_registry: Option<ServerRegistry>,
    imap_port: Option<u16>,
    folder: Option<String>,
    timeouts: Option<TimeoutConfig>,
    pacing: Option<Duration>,
    preview_chars: Option<usize>,
    channel_capacity: Option<usize>,
    group_prefix: Option<String>,
}

impl IngestConfigBuilder {
    /// Sets the registry used for IMAP host resolution.
    ///
    /// # Example
    ///
    /// ```
    /// use mail_ingest::{IngestConfig, ServerRegistry};
    ///
    /// let mut registry = ServerRegistry::with_defaults();
    /// registry.register("mycompany.com", "mail.internal.mycompany.com");
    ///
    /// let config = IngestConfig::builder()
    ///     .server_registry(registry)
    ///     .build()
    ///     .expect("valid config");
    ///
    /// assert_eq!(
    ///     config.server_registry.resolve("user@mycompany.com").unwrap(),
    ///     "mail.internal.mycompany.com"
    /// );
    /// ```
    #[must_use]
    pub fn server_registry(mut self, registry: ServerRegistry) -> Self {
        self.server_registry = Some(registry);
        self
    }

    /// Sets the IMAP server port.
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets the folder to ingest.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the authentication timeout.
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .auth = timeout;
        self
    }

    /// Sets the per-message fetch timeout.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .fetch = timeout;
        self
    }

    /// Sets the delay between processed messages.
    #[must_use]
    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Sets the preview length of new-record events.
    #[must_use]
    pub fn preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = Some(chars);
        self
    }

    /// Sets the per-group event buffer size.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// Sets the prefix of per-account progress groups.
    #[must_use]
    pub fn group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group_prefix = Some(prefix.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the folder or group prefix is
    /// empty, or the channel capacity is zero.
    pub fn build(self) -> Result<IngestConfig> {
        let defaults = IngestConfig::default();

        let folder = self.folder.unwrap_or(defaults.folder);
        if folder.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "folder must not be empty".into(),
            });
        }

        let channel_capacity = self.channel_capacity.unwrap_or(defaults.channel_capacity);
        if channel_capacity == 0 {
            return Err(Error::InvalidConfig {
                message: "channel capacity must be at least 1".into(),
            });
        }

        let group_prefix = self.group_prefix.unwrap_or(defaults.group_prefix);
        if group_prefix.is_empty() {
            return Err(Error::InvalidConfig {
                message: "group prefix must not be empty".into(),
            });
        }

        Ok(IngestConfig {
            server_registry: self.server_registry.unwrap_or(defaults.server_registry),
            imap_port: self.imap_port.unwrap_or(defaults.imap_port),
            folder,
            timeouts: self.timeouts.unwrap_or(defaults.timeouts),
            pacing: self.pacing.unwrap_or(defaults.pacing),
            preview_chars: self.preview_chars.unwrap_or(defaults.preview_chars),
            channel_capacity,
            group_prefix,
        })
    }
}
