//! IMAP server resolution from email domains.
//!
//! The allow-list is a table of domain suffix to IMAP host. Resolution picks
//! the longest suffix matching the address's domain on a label boundary, so
//! `corp.mail.ru` resolves through `mail.ru` while `notmail.ru` does not.
//! Domains matching nothing are rejected with
//! [`Error::UnsupportedProvider`](crate::Error::UnsupportedProvider).
//!
//! # Example
//!
//! ```
//! use mail_ingest::known_servers::ServerRegistry;
//!
//! let mut registry = ServerRegistry::with_defaults();
//! assert_eq!(registry.resolve("user@gmail.com").unwrap(), "imap.gmail.com");
//! assert!(registry.resolve("user@example.org").is_err());
//!
//! registry.register("mycompany.com", "mail.mycompany.com");
//! assert_eq!(registry.resolve("user@mycompany.com").unwrap(), "mail.mycompany.com");
//! ```

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::collections::HashMap;

/// Built-in suffix to IMAP host table.
const KNOWN_SERVERS: &[(&str, &str)] = &[
    ("gmail.com", "imap.gmail.com"),
    ("yandex.ru", "imap.yandex.ru"),
    ("yandex.com", "imap.yandex.ru"),
    // Mail.ru network
    ("mail.ru", "imap.mail.ru"),
    ("bk.ru", "imap.mail.ru"),
    ("inbox.ru", "imap.mail.ru"),
    ("list.ru", "imap.mail.ru"),
    ("internet.ru", "imap.mail.ru"),
];

/// A customizable suffix table for IMAP server resolution.
///
/// Custom entries override built-in ones for the same suffix.
#[derive(Debug, Clone)]
pub struct ServerRegistry {
    custom: HashMap<String, String>,
    use_defaults: bool,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ServerRegistry {
    /// Creates an empty registry without built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            custom: HashMap::new(),
            use_defaults: false,
        }
    }

    /// Creates a registry seeded with the built-in provider table.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            custom: HashMap::new(),
            use_defaults: true,
        }
    }

    /// Registers a suffix to IMAP host mapping.
    pub fn register(&mut self, suffix: impl Into<String>, imap_host: impl Into<String>) {
        let suffix = suffix.into().trim_start_matches('.').to_lowercase();
        self.custom.insert(suffix, imap_host.into());
    }

    /// Registers multiple mappings at once.
    pub fn register_many<I, D, H>(&mut self, mappings: I)
    where
        I: IntoIterator<Item = (D, H)>,
        D: Into<String>,
        H: Into<String>,
    {
        for (suffix, host) in mappings {
            self.register(suffix, host);
        }
    }

    /// Removes a custom mapping.
    pub fn unregister(&mut self, suffix: &str) -> Option<String> {
        self.custom.remove(&suffix.to_lowercase())
    }

    /// Resolves the IMAP hostname for an email address (or bare domain).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedProvider`] if no suffix matches.
    pub fn resolve(&self, email: &str) -> Result<Cow<'_, str>> {
        let domain = domain_of(email);

        let custom = self
            .custom
            .iter()
            .filter(|(suffix, _)| suffix_matches(&domain, suffix))
            .map(|(suffix, host)| (suffix.len(), Cow::Borrowed(host.as_str())));

        let builtin = KNOWN_SERVERS
            .iter()
            .filter(|_| self.use_defaults)
            .filter(|(suffix, _)| !self.custom.contains_key(*suffix))
            .filter(|(suffix, _)| suffix_matches(&domain, suffix))
            .map(|&(suffix, host)| (suffix.len(), Cow::Borrowed(host)));

        // `max_by_key` keeps the last maximum, so custom entries chained last win ties.
        let host = builtin
            .chain(custom)
            .max_by_key(|(len, _)| *len)
            .map(|(_, host)| host);

        host.ok_or(Error::UnsupportedProvider { domain })
    }

    /// Returns `true` if the domain resolves to a known IMAP host.
    #[must_use]
    pub fn is_known(&self, domain: &str) -> bool {
        self.resolve(domain).is_ok()
    }

    /// Returns all registered suffixes (custom + defaults if enabled).
    #[must_use]
    pub fn suffixes(&self) -> Vec<Cow<'_, str>> {
        let mut suffixes: Vec<Cow<'_, str>> = self
            .custom
            .keys()
            .map(|s| Cow::Borrowed(s.as_str()))
            .collect();

        if self.use_defaults {
            for &(suffix, _) in KNOWN_SERVERS {
                if !self.custom.contains_key(suffix) {
                    suffixes.push(Cow::Borrowed(suffix));
                }
            }
        }

        suffixes
    }

    /// Returns the number of registered mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.suffixes().len()
    }

    /// Returns `true` if the registry has no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.custom.is_empty() && !self.use_defaults
    }
}

/// Resolves the IMAP hostname for an email address using the built-in table.
///
/// # Errors
///
/// Returns [`Error::UnsupportedProvider`] if the domain is not supported.
///
/// # Example
///
/// ```
/// use mail_ingest::known_servers::resolve_imap_host;
///
/// assert_eq!(resolve_imap_host("user@bk.ru").unwrap(), "imap.mail.ru");
/// assert!(resolve_imap_host("user@custom.org").is_err());
/// ```
pub fn resolve_imap_host(email: &str) -> Result<String> {
    ServerRegistry::with_defaults()
        .resolve(email)
        .map(Cow::into_owned)
}

/// Returns all built-in suffixes.
#[must_use]
pub fn known_suffixes() -> Vec<&'static str> {
    KNOWN_SERVERS.iter().map(|&(suffix, _)| suffix).collect()
}

fn domain_of(email: &str) -> String {
    email
        .rsplit_once('@')
        .map_or(email, |(_, domain)| domain)
        .trim()
        .trim_end_matches('.')
        .to_lowercase()
}

fn suffix_matches(domain: &str, suffix: &str) -> bool {
    domain == suffix
        || domain
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.'))
}
