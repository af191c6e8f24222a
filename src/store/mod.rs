//! Persistence of ingested messages.
//!
//! A message is a duplicate when the same account already holds a record
//! with identical subject, sender and send date. The check and the insert
//! are separate calls; two concurrent runs for one account may both insert.

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::credentials::AccountId;
use crate::error::Result;
use crate::parser::ParsedMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields that identify a message within an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupKey<'a> {
    /// Owning account.
    pub account: AccountId,
    /// Decoded sender.
    pub sender: &'a str,
    /// Decoded subject.
    pub subject: &'a str,
    /// Send date.
    pub sent_date: DateTime<Utc>,
}

impl<'a> DedupKey<'a> {
    /// The key of `message` under `account`.
    #[must_use]
    pub fn for_message(account: AccountId, message: &'a ParsedMessage) -> Self {
        Self {
            account,
            sender: &message.sender,
            subject: &message.subject,
            sent_date: message.sent_date,
        }
    }

    fn matches(&self, record: &StoredRecord) -> bool {
        record.account == self.account
            && record.message.sender == self.sender
            && record.message.subject == self.subject
            && record.message.sent_date == self.sent_date
    }
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Record identity.
    pub id: RecordId,
    /// Owning account.
    pub account: AccountId,
    /// Stored content.
    pub message: ParsedMessage,
}

/// Durable store of ingested messages.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether a record with this key already exists.
    async fn exists(&self, key: &DedupKey<'_>) -> Result<bool>;

    /// Persists `message` for `account` and returns the new record's id.
    async fn insert(&self, account: AccountId, message: &ParsedMessage) -> Result<RecordId>;

    /// Every record of `account`, oldest insert first.
    async fn records_for(&self, account: AccountId) -> Result<Vec<StoredRecord>>;
}
