//! Message model representing a fetched Gmail message

use super::ThreadId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label Gmail attaches to messages that have not been read
pub const UNREAD_LABEL: &str = "UNREAD";

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lightweight search result: identifies a message that has not been fetched yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePointer {
    pub id: MessageId,
    pub thread_id: ThreadId,
}

impl MessagePointer {
    pub fn new(id: impl Into<MessageId>, thread_id: impl Into<ThreadId>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
        }
    }
}

/// A fully materialized message
///
/// Immutable once built; `is_read` is always derived from the label set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Gmail message ID
    pub id: MessageId,
    /// ID of the thread this message belongs to
    pub thread_id: ThreadId,
    /// Subject line
    pub subject: String,
    /// Raw `From` header
    pub from: String,
    /// Raw `To` header
    pub to: String,
    /// RFC 3339 timestamp when parseable, otherwise the raw header text
    pub date: String,
    /// Provider-generated preview text
    pub snippet: String,
    /// Decoded body text
    pub body: String,
    /// Gmail label IDs (e.g., "INBOX", "UNREAD")
    pub labels: BTreeSet<String>,
    /// Whether the message lacks the UNREAD label
    pub is_read: bool,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: MessageId, thread_id: ThreadId) -> MessageBuilder {
        MessageBuilder::new(id, thread_id)
    }

    /// Body text, or the snippet when the body is blank
    pub fn text(&self) -> &str {
        if self.body.trim().is_empty() {
            &self.snippet
        } else {
            &self.body
        }
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    thread_id: ThreadId,
    subject: Option<String>,
    from: Option<String>,
    to: Option<String>,
    date: Option<String>,
    snippet: String,
    body: String,
    labels: BTreeSet<String>,
}

impl MessageBuilder {
    /// Fallback for a missing Subject header
    pub const NO_SUBJECT: &'static str = "No subject";
    /// Fallback for missing From/To/Date headers
    pub const UNKNOWN: &'static str = "Unknown";

    fn new(id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            id,
            thread_id,
            subject: None,
            from: None,
            to: None,
            date: None,
            snippet: String::new(),
            body: String::new(),
            labels: BTreeSet::new(),
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Message {
        let is_read = !self.labels.contains(UNREAD_LABEL);
        Message {
            id: self.id,
            thread_id: self.thread_id,
            subject: self.subject.unwrap_or_else(|| Self::NO_SUBJECT.to_string()),
            from: self.from.unwrap_or_else(|| Self::UNKNOWN.to_string()),
            to: self.to.unwrap_or_else(|| Self::UNKNOWN.to_string()),
            date: self.date.unwrap_or_else(|| Self::UNKNOWN.to_string()),
            snippet: self.snippet,
            body: self.body,
            labels: self.labels,
            is_read,
        }
    }
}
