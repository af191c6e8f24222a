//! Decoding of raw RFC 822 messages into [`ParsedMessage`] records.
//!
//! Body selection: a plain-text part wins over an HTML part. HTML is still
//! mined for tables (see [`crate::tables`]) and their key/value text is
//! appended to the chosen body. Attachment parts contribute only a sanitized
//! filename.

use crate::error::{Error, Result};
use crate::tables::extract_tables;
use chrono::{DateTime, NaiveDateTime, Utc};
use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Characters stripped from attachment filenames.
const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|', '#'];

/// Date layouts with an explicit offset, tried after RFC 2822 and RFC 3339.
const OFFSET_DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M %z",
    "%a, %d %b %y %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%a %b %e %H:%M:%S %Y %z",
];

/// Date layouts without an offset; these are read as UTC.
const NAIVE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%a %b %e %H:%M:%S %Y",
];

/// Trailing `(comment)` such as `(UTC)` or `(Pacific Standard Time)`.
static TRAILING_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("valid regex"));

/// Trailing textual UTC designator that RFC 2822 parsers reject.
static TRAILING_UTC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(?:UTC|Z)$").expect("valid regex"));

/// A message normalized for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Decoded `Subject` header, empty when absent.
    pub subject: String,
    /// Decoded `From` header, empty when absent.
    pub sender: String,
    /// Parsed `Date` header.
    pub sent_date: DateTime<Utc>,
    /// Chosen body text, with extracted table data appended.
    pub body: String,
    /// Sanitized attachment filenames, in message order.
    pub attachments: Vec<String>,
}

/// Parses one raw message.
///
/// # Errors
///
/// Returns [`Error::ParseEmail`] if the MIME structure or a body cannot be
/// decoded, and [`Error::MalformedMessage`] if the `Date` header is missing
/// or unparseable.
pub fn parse(raw: &[u8]) -> Result<ParsedMessage> {
    let mail = parse_mail(raw).map_err(|source| Error::ParseEmail { source })?;

    let subject = mail.headers.get_first_value("Subject").unwrap_or_default();
    let sender = mail.headers.get_first_value("From").unwrap_or_default();

    let date_header =
        mail.headers
            .get_first_value("Date")
            .ok_or_else(|| Error::MalformedMessage {
                reason: "missing Date header".into(),
            })?;
    let sent_date = parse_date(&date_header)?;

    let parts = collect_parts(&mail)?;

    debug!(
        has_text = parts.text.is_some(),
        has_html = parts.html.is_some(),
        attachments = parts.attachments.len(),
        "Parsed message structure"
    );

    Ok(ParsedMessage {
        subject,
        sender,
        sent_date,
        body: parts.compose_body(),
        attachments: parts.attachments,
    })
}

#[derive(Debug, Default)]
struct BodyParts {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<String>,
}

impl BodyParts {
    fn compose_body(&self) -> String {
        let mut body = self
            .text
            .as_deref()
            .or(self.html.as_deref())
            .unwrap_or_default()
            .to_string();

        if let Some(html) = &self.html {
            let tables = extract_tables(html);
            if !tables.is_empty() {
                body.push_str("\n\n");
                body.push_str(&tables);
            }
        }

        body
    }
}

fn collect_parts(mail: &ParsedMail<'_>) -> Result<BodyParts> {
    let mut parts = BodyParts::default();

    if mail.subparts.is_empty() {
        set_text_body(mail, &mut parts)?;
    } else {
        walk_parts(mail, &mut parts)?;
    }

    Ok(parts)
}

/// Visits every leaf part depth-first, in document order.
fn walk_parts(part: &ParsedMail<'_>, parts: &mut BodyParts) -> Result<()> {
    if !part.subparts.is_empty() {
        for subpart in &part.subparts {
            walk_parts(subpart, parts)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    if disposition.disposition == DispositionType::Attachment {
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"));

        if let Some(filename) = filename {
            let sanitized = sanitize_filename(filename);
            if !sanitized.is_empty() {
                parts.attachments.push(sanitized);
            }
        }
        return Ok(());
    }

    set_text_body(part, parts)
}

fn set_text_body(part: &ParsedMail<'_>, parts: &mut BodyParts) -> Result<()> {
    match part.ctype.mimetype.to_lowercase().as_str() {
        "text/plain" => parts.text = Some(decoded_body(part)?),
        "text/html" => parts.html = Some(decoded_body(part)?),
        _ => {}
    }
    Ok(())
}

fn decoded_body(part: &ParsedMail<'_>) -> Result<String> {
    part.get_body().map_err(|source| Error::ParseEmail { source })
}

/// Decodes encoded words in a filename and strips characters illegal in filenames.
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    decode_encoded_words(raw)
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Resolves RFC 2047 encoded words by reading the text as a header value.
fn decode_encoded_words(raw: &str) -> String {
    if !raw.contains("=?") {
        return raw.to_string();
    }

    let line = format!("X-Filename: {}", raw.replace(['\r', '\n'], " "));
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => raw.to_string(),
    }
}

/// Parses a `Date` header value, tolerating common deviations from RFC 2822.
///
/// # Errors
///
/// Returns [`Error::MalformedMessage`] if no known layout matches.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_comment = TRAILING_COMMENT.replace(&collapsed, "");
    let cleaned = TRAILING_UTC.replace(&without_comment, " +0000");
    let cleaned = cleaned.trim();

    if let Ok(date) = DateTime::parse_from_rfc2822(cleaned) {
        return Ok(date.with_timezone(&Utc));
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(cleaned) {
        return Ok(date.with_timezone(&Utc));
    }

    for format in OFFSET_DATE_FORMATS {
        if let Ok(date) = DateTime::parse_from_str(cleaned, format) {
            return Ok(date.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(cleaned, format) {
            return Ok(date.and_utc());
        }
    }

    mailparse::dateparse(cleaned)
        .ok()
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
        .ok_or_else(|| Error::MalformedMessage {
            reason: format!("unparseable Date header: {value}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PLAIN: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: Lunch\r\n\
Date: Tue, 1 Jul 2025 10:52:37 +0200\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
See you at noon.";

    fn multipart_with_attachment() -> Vec<u8> {
        b"From: billing@shop.example\r\n\
Subject: Your invoice\r\n\
Date: Wed, 2 Jul 2025 08:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Invoice attached.\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"Invoice #1.pdf\"\r\n\
Content-Disposition: attachment; filename=\"Invoice #1.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQKc2VjcmV0LXBkZi1ieXRlcw==\r\n\
--XYZ--\r\n"
            .to_vec()
    }

    #[test]
    fn test_plain_single_part() {
        let message = parse(PLAIN).unwrap();

        assert_eq!(message.subject, "Lunch");
        assert_eq!(message.sender, "Alice <alice@example.com>");
        assert_eq!(message.body, "See you at noon.");
        assert!(message.attachments.is_empty());
        assert_eq!(
            message.sent_date,
            Utc.with_ymd_and_hms(2025, 7, 1, 8, 52, 37).unwrap()
        );
    }

    #[test]
    fn test_attachment_is_sanitized_and_excluded_from_body() {
        let message = parse(&multipart_with_attachment()).unwrap();

        assert_eq!(message.attachments, vec!["Invoice 1.pdf".to_string()]);
        assert_eq!(message.body.trim_end(), "Invoice attached.");
        assert!(!message.body.contains("%PDF"));
        assert!(!message.body.contains("JVBERi0"));
    }

    #[test]
    fn test_encoded_word_headers() {
        let raw = b"From: =?UTF-8?B?0JjQstCw0L0=?= <ivan@mail.ru>\r\n\
Subject: =?UTF-8?Q?Caf=C3=A9_menu?=\r\n\
Date: Thu, 3 Jul 2025 12:00:00 +0300\r\n\
\r\n\
body";
        let message = parse(raw).unwrap();

        assert_eq!(message.subject, "Café menu");
        assert_eq!(message.sender, "Иван <ivan@mail.ru>");
    }

    #[test]
    fn test_html_only_single_part_gets_table_text() {
        let raw = b"From: shop@example.com\r\n\
Subject: Order\r\n\
Date: Thu, 3 Jul 2025 12:00:00 +0000\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<table><tr><th>Name</th><th>Amount</th></tr><tr><td>Widget</td><td>5</td></tr></table>";
        let message = parse(raw).unwrap();

        assert!(message.body.starts_with("<table>"));
        assert!(message.body.ends_with("\n\nName: Widget\nAmount: 5"));
    }

    #[test]
    fn test_text_preferred_over_html_with_tables_appended() {
        let raw = b"From: shop@example.com\r\n\
Subject: Order\r\n\
Date: Thu, 3 Jul 2025 12:00:00 +0000\r\n\
Content-Type: multipart/alternative; boundary=\"ALT\"\r\n\
\r\n\
--ALT\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Thanks for your order.\r\n\
--ALT\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<table><tr><td>Item</td></tr><tr><td>Widget</td></tr></table>\r\n\
--ALT--\r\n";
        let message = parse(raw).unwrap();

        assert!(message.body.starts_with("Thanks for your order."));
        assert!(message.body.ends_with("\n\nItem: Widget"));
        assert!(!message.body.contains("<table>"));
    }

    #[test]
    fn test_non_text_single_part_has_empty_body() {
        let raw = b"From: a@example.com\r\n\
Subject: Picture\r\n\
Date: Thu, 3 Jul 2025 12:00:00 +0000\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=";
        let message = parse(raw).unwrap();

        assert!(message.body.is_empty());
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_missing_date_is_malformed() {
        let raw = b"From: a@example.com\r\nSubject: No date\r\n\r\nbody";
        let err = parse(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
    }

    #[test]
    fn test_garbage_date_is_malformed() {
        let err = parse_date("sometime last week").unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
    }

    #[test]
    fn test_date_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 7, 1, 8, 52, 37).unwrap();

        for value in [
            "Tue, 1 Jul 2025 08:52:37 +0000",
            "Tue, 1 Jul 2025 08:52:37 +0000 (UTC)",
            "1 Jul 2025 08:52:37 +0000",
            "Tue,  1 Jul 2025 08:52:37 GMT",
            "Tue, 1 Jul 2025 08:52:37 UTC",
            "Tue, 1 Jul 2025 04:52:37 EDT",
            "2025-07-01T08:52:37Z",
            "2025-07-01 08:52:37",
        ] {
            assert_eq!(parse_date(value).unwrap(), expected, "{value}");
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Invoice #1.pdf"), "Invoice 1.pdf");
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j.txt"), "abcdefghij.txt");
        assert_eq!(sanitize_filename("=?UTF-8?B?0L7RgtGH0ZHRgi5wZGY=?="), "отчёт.pdf");
    }

    #[test]
    fn test_attachment_without_name_is_skipped() {
        let raw = b"From: a@example.com\r\n\
Subject: Blob\r\n\
Date: Thu, 3 Jul 2025 12:00:00 +0000\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: text/plain\r\n\
\r\n\
hi\r\n\
--B\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment\r\n\
\r\n\
xxxx\r\n\
--B--\r\n";
        let message = parse(raw).unwrap();
        assert!(message.attachments.is_empty());
    }
}
