//! Mailbox metadata: labels and the account profile

use serde::{Deserialize, Serialize};

/// A mail label as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label ID (e.g., "INBOX", "UNREAD", "Label_123")
    pub id: String,
    /// Display name
    pub name: String,
    /// Whether this is a system label
    pub is_system: bool,
}

impl Label {
    pub fn new(id: impl Into<String>, name: impl Into<String>, is_system: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_system,
        }
    }
}

/// Summary of the authenticated mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub email_address: String,
    pub messages_total: u64,
    pub threads_total: u64,
    pub history_id: Option<String>,
}
