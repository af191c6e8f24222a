//! Progress events published during an ingestion run, and their wire form.

use crate::parser::ParsedMessage;
use crate::store::RecordId;
use serde::{Deserialize, Serialize};

/// Date layout used in record summaries.
pub const SUMMARY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One unit of the status stream pushed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// A message was processed (persisted or skipped as a duplicate).
    Progress {
        /// Share of the mailbox processed so far, 0 to 100.
        percent: u8,
        /// Human-readable count, e.g. `Processed 3 of 5 emails.`
        message: String,
    },
    /// A new record was persisted.
    NewRecord(RecordSummary),
    /// The run failed and stopped.
    Error {
        /// What went wrong.
        detail: String,
    },
}

impl ProgressEvent {
    /// Builds the progress event for `processed` of `total` messages.
    ///
    /// The percentage is rounded half up. `total` must be non-zero.
    #[must_use]
    pub fn progress(processed: usize, total: usize) -> Self {
        let total = total.max(1);
        let percent = (processed.min(total) * 100 + total / 2) / total;
        Self::Progress {
            percent: u8::try_from(percent).unwrap_or(100),
            message: format!("Processed {processed} of {total} emails."),
        }
    }

    /// Builds an error event.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
        }
    }
}

/// Observer-facing summary of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    /// Identity assigned by the record store.
    pub id: RecordId,
    /// Decoded subject.
    pub subject: String,
    /// Decoded sender.
    pub sender: String,
    /// Send date formatted as [`SUMMARY_DATE_FORMAT`].
    pub sent_date: String,
    /// Leading characters of the body followed by `...`.
    pub body: String,
    /// Attachment names joined with `", "`.
    pub attachments: String,
}

impl RecordSummary {
    /// Summarizes a stored message, keeping `preview_chars` characters of its body.
    #[must_use]
    pub fn new(id: RecordId, message: &ParsedMessage, preview_chars: usize) -> Self {
        let preview: String = message.body.chars().take(preview_chars).collect();

        Self {
            id,
            subject: message.subject.clone(),
            sender: message.sender.clone(),
            sent_date: message.sent_date.format(SUMMARY_DATE_FORMAT).to_string(),
            body: format!("{preview}..."),
            attachments: message.attachments.join(", "),
        }
    }
}

/// Wire encoding of an event: a flat record whose fields are all optional.
///
/// Absent fields are omitted when serializing and tolerated when
/// deserializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Progress percentage, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Human-readable status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Newly stored record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_email: Option<RecordSummary>,
}

impl WireEvent {
    /// A frame carrying only an error.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            error: Some(detail.into()),
            ..Self::default()
        }
    }

    /// Serializes the frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which only occurs for non-string map keys.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a JSON frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object of the expected shape.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl From<&ProgressEvent> for WireEvent {
    fn from(event: &ProgressEvent) -> Self {
        match event {
            ProgressEvent::Progress { percent, message } => Self {
                progress: Some(*percent),
                message: Some(message.clone()),
                ..Self::default()
            },
            ProgressEvent::NewRecord(record) => Self {
                new_email: Some(record.clone()),
                ..Self::default()
            },
            ProgressEvent::Error { detail } => Self::error(detail.clone()),
        }
    }
}

impl From<ProgressEvent> for WireEvent {
    fn from(event: ProgressEvent) -> Self {
        Self::from(&event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn message(body: &str, attachments: &[&str]) -> ParsedMessage {
        ParsedMessage {
            subject: "Invoice".into(),
            sender: "billing@shop.example".into(),
            sent_date: Utc.with_ymd_and_hms(2025, 7, 2, 8, 5, 59).unwrap(),
            body: body.into(),
            attachments: attachments.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_progress_rounds_half_up() {
        assert_eq!(
            ProgressEvent::progress(1, 3),
            ProgressEvent::Progress {
                percent: 33,
                message: "Processed 1 of 3 emails.".into()
            }
        );
        assert!(matches!(
            ProgressEvent::progress(2, 3),
            ProgressEvent::Progress { percent: 67, .. }
        ));
        assert!(matches!(
            ProgressEvent::progress(1, 8),
            ProgressEvent::Progress { percent: 13, .. }
        ));
        assert!(matches!(
            ProgressEvent::progress(5, 5),
            ProgressEvent::Progress { percent: 100, .. }
        ));
    }

    #[test]
    fn test_summary_truncates_by_characters() {
        let body = "é".repeat(60);
        let summary = RecordSummary::new(RecordId(9), &message(&body, &[]), 50);

        assert_eq!(summary.body, format!("{}...", "é".repeat(50)));
        assert_eq!(summary.sent_date, "2025-07-02 08:05");
        assert_eq!(summary.attachments, "");
    }

    #[test]
    fn test_summary_short_body_still_gets_ellipsis() {
        let summary = RecordSummary::new(RecordId(1), &message("Hi", &["a.pdf", "b.png"]), 50);

        assert_eq!(summary.body, "Hi...");
        assert_eq!(summary.attachments, "a.pdf, b.png");
    }

    #[test]
    fn test_tagged_event_shape() {
        let value = serde_json::to_value(ProgressEvent::progress(1, 2)).unwrap();
        assert_eq!(
            value,
            json!({"kind": "progress", "percent": 50, "message": "Processed 1 of 2 emails."})
        );

        let value = serde_json::to_value(ProgressEvent::error("boom")).unwrap();
        assert_eq!(value, json!({"kind": "error", "detail": "boom"}));
    }

    #[test]
    fn test_tagged_new_record_is_flattened() {
        let record = RecordSummary::new(RecordId(2), &message("x", &[]), 50);
        let value = serde_json::to_value(ProgressEvent::NewRecord(record)).unwrap();

        assert_eq!(value["kind"], "newRecord");
        assert_eq!(value["id"], 2);
        assert_eq!(value["body"], "x...");
    }

    #[test]
    fn test_wire_omits_absent_fields() {
        let wire = WireEvent::from(ProgressEvent::progress(3, 4));
        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            json!({"progress": 75, "message": "Processed 3 of 4 emails."})
        );

        let wire = WireEvent::from(ProgressEvent::error("Authentication failed: bad password"));
        assert_eq!(
            wire.to_json().unwrap(),
            r#"{"error":"Authentication failed: bad password"}"#
        );
    }

    #[test]
    fn test_wire_new_email() {
        let record = RecordSummary::new(RecordId(4), &message("Total 5", &["Invoice 1.pdf"]), 50);
        let wire = WireEvent::from(ProgressEvent::NewRecord(record));

        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            json!({"new_email": {
                "id": 4,
                "subject": "Invoice",
                "sender": "billing@shop.example",
                "sent_date": "2025-07-02 08:05",
                "body": "Total 5...",
                "attachments": "Invoice 1.pdf"
            }})
        );
    }

    #[test]
    fn test_wire_accepts_partial_frames() {
        let wire = WireEvent::from_json(r#"{"message": "hello"}"#).unwrap();
        assert_eq!(wire.message.as_deref(), Some("hello"));
        assert!(wire.progress.is_none());
        assert!(wire.error.is_none());

        assert_eq!(WireEvent::from_json("{}").unwrap(), WireEvent::default());
    }
}
