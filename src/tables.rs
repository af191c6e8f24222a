//! Best-effort recovery of key/value data from HTML tables.
//!
//! Notification emails often carry their payload in a table whose first row
//! names the columns. [`extract_tables`] turns every later row into
//! `"{header}: {value}"` lines by pairing cells with headers positionally.
//!
//! ```
//! use mail_ingest::tables::extract_tables;
//!
//! let html = "<table><tr><th>Name</th><th>Amount</th></tr>\
//!             <tr><td>Widget</td><td>5</td></tr></table>";
//! assert_eq!(extract_tables(html), "Name: Widget\nAmount: 5");
//! assert_eq!(extract_tables("plain text"), "");
//! ```

use scraper::{ElementRef, Html, Selector};
use std::fmt::Write as _;
use std::sync::LazyLock;

static TABLES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));

static ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));

/// Extracts `header: value` lines from every table in `html`.
///
/// Returns an empty string when the input does not look like markup or
/// holds no table with a header row and at least one data row.
#[must_use]
pub fn extract_tables(html: &str) -> String {
    if !html.trim_start().starts_with('<') {
        return String::new();
    }

    let document = Html::parse_document(html);

    let mut output = String::new();
    for table in document.select(&TABLES) {
        let rows = table_rows(table);
        let Some((headers, rows)) = rows.split_first() else {
            continue;
        };
        for row in rows {
            for (header, value) in headers.iter().zip(row) {
                // Writing to a String cannot fail.
                let _ = writeln!(output, "{header}: {value}");
            }
        }
    }

    output.trim().to_string()
}

/// Cell texts of the rows owned by `table`, skipping rows of nested tables.
fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    table
        .select(&ROWS)
        .filter(|row| owning_table(*row) == Some(table))
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(cell_text)
                .collect()
        })
        .collect()
}

fn owning_table(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "table")
}

fn cell_text(cell: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(cell, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        match child.value().name() {
            // Nested tables are reported on their own.
            "script" | "style" | "table" => {}
            "br" | "p" | "div" | "li" => {
                out.push(' ');
                push_text(child, out);
                out.push(' ');
            }
            _ => push_text(child, out),
        }
    }
}
