use super::{DedupKey, RecordId, RecordStore, StoredRecord};
use crate::credentials::AccountId;
use crate::error::Result;
use crate::parser::ParsedMessage;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Record store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, oldest first.
    pub async fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().await.clone()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn exists(&self, key: &DedupKey<'_>) -> Result<bool> {
        Ok(self.records.lock().await.iter().any(|r| key.matches(r)))
    }

    async fn insert(&self, account: AccountId, message: &ParsedMessage) -> Result<RecordId> {
        let mut records = self.records.lock().await;
        let id = RecordId(records.len() as u64 + 1);

        records.push(StoredRecord {
            id,
            account,
            message: message.clone(),
        });

        Ok(id)
    }

    async fn records_for(&self, account: AccountId) -> Result<Vec<StoredRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.account == account)
            .cloned()
            .collect())
    }
}
