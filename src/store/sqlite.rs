use super::{DedupKey, RecordId, RecordStore, StoredRecord};
use crate::credentials::AccountId;
use crate::error::{Error, Result};
use crate::parser::ParsedMessage;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id  INTEGER NOT NULL,
        subject     TEXT NOT NULL,
        sender      TEXT NOT NULL,
        sent_date   TEXT NOT NULL,
        body        TEXT NOT NULL,
        attachments TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS messages_dedup
        ON messages (account_id, subject, sender, sent_date);
"#;

/// Record store backed by a SQLite database.
///
/// Statements run on the blocking thread pool. Send dates are stored as
/// RFC 3339 text in UTC, attachment names as a JSON array.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::store("open", e))?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::store("open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::store("migrate", e))?;
        debug!("Record store ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn).map_err(|e| Error::store(operation, e))
        })
        .await
        .map_err(|e| Error::IngestionFailure {
            message: format!("record store task failed: {e}"),
        })?
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    let sent_date: String = row.get(4)?;
    let sent_date = DateTime::parse_from_rfc3339(&sent_date)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    let attachments: String = row.get(6)?;
    let attachments = serde_json::from_str(&attachments)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(StoredRecord {
        id: RecordId(row.get(0)?),
        account: AccountId(row.get(1)?),
        message: ParsedMessage {
            subject: row.get(2)?,
            sender: row.get(3)?,
            sent_date,
            body: row.get(5)?,
            attachments,
        },
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn exists(&self, key: &DedupKey<'_>) -> Result<bool> {
        let account = key.account.0;
        let subject = key.subject.to_string();
        let sender = key.sender.to_string();
        let sent_date = format_date(key.sent_date);

        self.run("exists", move |conn| {
            conn.query_row(
                "SELECT 1 FROM messages \
                 WHERE account_id = ?1 AND subject = ?2 AND sender = ?3 AND sent_date = ?4 \
                 LIMIT 1",
                params![account, subject, sender, sent_date],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
        })
        .await
    }

    async fn insert(&self, account: AccountId, message: &ParsedMessage) -> Result<RecordId> {
        let attachments =
            serde_json::to_string(&message.attachments).map_err(|e| Error::store("insert", e))?;
        let message = message.clone();

        self.run("insert", move |conn| {
            conn.query_row(
                "INSERT INTO messages (account_id, subject, sender, sent_date, body, attachments) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 RETURNING id",
                params![
                    account.0,
                    message.subject,
                    message.sender,
                    format_date(message.sent_date),
                    message.body,
                    attachments,
                ],
                |row| row.get(0).map(RecordId),
            )
        })
        .await
    }

    async fn records_for(&self, account: AccountId) -> Result<Vec<StoredRecord>> {
        self.run("records_for", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account_id, subject, sender, sent_date, body, attachments \
                 FROM messages WHERE account_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![account.0], read_record)?;
            rows.collect()
        })
        .await
    }
}
