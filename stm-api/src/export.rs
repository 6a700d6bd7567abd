//! Rendering stored conversations as portable JSON or CSV documents.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use stm_core::{AXIS_LABELS, ExchangeRecord};

use crate::envelope::{unix_now, unix_seconds};

/// Formats a conversation export can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Structured JSON document.
    Json,
    /// Flat CSV table.
    Csv,
}

/// Error returned when an export format name is not recognised.
#[derive(Debug, Error)]
#[error("unknown export format `{0}` (expected `json` or `csv`)")]
pub struct UnknownFormat(String);

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(UnknownFormat(s.to_owned())),
        }
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    exported_at: f64,
    entries: usize,
    conversations: Vec<JsonConversation<'a>>,
}

#[derive(Serialize)]
struct JsonConversation<'a> {
    id: String,
    timestamp: f64,
    datetime: String,
    user_message: &'a str,
    assistant_response: &'a str,
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    coordinate_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coordinate: Option<&'a [f64]>,
}

/// Renders `records` in the requested format.
pub(crate) fn render(
    records: &[ExchangeRecord],
    format: ExportFormat,
    include_coordinates: bool,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json(records, include_coordinates),
        ExportFormat::Csv => Ok(render_csv(records, include_coordinates)),
    }
}

fn render_json(
    records: &[ExchangeRecord],
    include_coordinates: bool,
) -> serde_json::Result<String> {
    let conversations = records
        .iter()
        .map(|record| JsonConversation {
            id: record.id().to_string(),
            timestamp: unix_seconds(record.created_at()),
            datetime: rfc3339(record.created_at()),
            user_message: record.user_text(),
            assistant_response: record.response_text(),
            summary: record.summary(),
            coordinate_key: include_coordinates.then(|| record.coordinate_key()),
            coordinate: include_coordinates.then(|| record.coordinate().as_slice()),
        })
        .collect();
    serde_json::to_string_pretty(&JsonExport {
        exported_at: unix_now(),
        entries: records.len(),
        conversations,
    })
}

fn render_csv(records: &[ExchangeRecord], include_coordinates: bool) -> String {
    let mut header: Vec<String> = vec![
        "id".into(),
        "timestamp".into(),
        "datetime".into(),
        "user_message".into(),
        "assistant_response".into(),
        "summary".into(),
    ];
    if include_coordinates {
        header.push("coordinate_key".into());
        for label in AXIS_LABELS {
            header.push(format!("coordinate_{label}"));
        }
    }

    let mut out = header.join(",");
    out.push('\n');
    for record in records {
        let mut row: Vec<String> = vec![
            record.id().to_string(),
            format!("{:.3}", unix_seconds(record.created_at())),
            rfc3339(record.created_at()),
            csv_escape(record.user_text()),
            csv_escape(record.response_text()),
            csv_escape(record.summary()),
        ];
        if include_coordinates {
            row.push(csv_escape(&record.coordinate_key()));
            for value in record.coordinate().as_slice() {
                row.push(format!("{value:.6}"));
            }
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn rfc3339(at: SystemTime) -> String {
    DateTime::<Utc>::from(at).to_rfc3339()
}

// RFC 4180 quoting: wrap fields containing separators or quotes, doubling
// any embedded quotes.
fn csv_escape(field: &str) -> String {
    if field.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}
