//! JSON export of retrieved batches

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::Message;

/// Exported form of one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedMessage {
    pub id: String,
    pub date: String,
    pub subject: String,
    pub from: String,
    pub snippet: String,
    pub is_read: bool,
    pub body: String,
}

impl From<&Message> for ExportedMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            date: message.date.clone(),
            subject: message.subject.clone(),
            from: message.from.clone(),
            snippet: message.snippet.clone(),
            is_read: message.is_read,
            body: message.body.clone(),
        }
    }
}

/// A retrieved batch as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    /// RFC 3339 timestamp of the export
    pub export_date: String,
    pub total_emails: usize,
    /// Provider query that produced the batch
    pub query: String,
    pub messages: Vec<ExportedMessage>,
}

impl ExportRecord {
    pub fn new<Tz: TimeZone>(
        query: impl Into<String>,
        messages: &[Message],
        now: DateTime<Tz>,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            export_date: now.to_rfc3339(),
            total_emails: messages.len(),
            query: query.into(),
            messages: messages.iter().map(ExportedMessage::from).collect(),
        }
    }
}

/// Write `record` as pretty-printed JSON, creating parent directories
pub fn write_export(path: &Path, record: &ExportRecord) -> Result<()> {
    config::save_json_file(path, record)
        .map_err(|e| Error::Io(std::io::Error::other(format!("{e:#}"))))?;
    log::info!(
        "Exported {} messages to {}",
        record.total_emails,
        path.display()
    );
    Ok(())
}

/// Timestamped default file name, e.g. `sift-export-20240601-093000.json`
pub fn default_export_filename(now: DateTime<Local>) -> String {
    format!("sift-export-{}.json", now.format("%Y%m%d-%H%M%S"))
}
