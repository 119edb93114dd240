//! Gmail API integration
//!
//! This module provides:
//! - Credential persistence and the per-session credential context
//! - OAuth2 authorization code flow with a one-shot loopback listener
//! - Gmail API client for listing and fetching messages
//! - Multipart body decoding and response normalization

mod auth;
mod callback;
mod client;
mod context;
mod credentials;
mod decode;
mod normalize;
mod oauth;

pub use auth::{AuthState, Authenticator};
pub use callback::{CallbackOutcome, LoopbackConsent};
pub use client::{GmailClient, MailApi};
pub use context::CredentialContext;
pub use credentials::{CredentialStore, TokenSet};
pub use decode::{ContentNode, decode_base64_body, decode_body};
pub use normalize::normalize_message;
pub use oauth::{AuthorizationCode, ConsentFlow, GoogleOAuth, OAuthProvider, authorization_url};

/// Gmail API response types
pub mod api {
    use serde::Deserialize;

    /// Response from listing messages
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: String,
    }

    /// Full message from Gmail API
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: String,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        pub internal_date: Option<String>,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers and body
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Deserialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Message body (may be base64 encoded)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub data: Option<String>,
    }

    /// Message part (for multipart messages)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub mime_type: Option<String>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Response from `users/me/profile`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub email_address: String,
        #[serde(default)]
        pub messages_total: u64,
        #[serde(default)]
        pub threads_total: u64,
        pub history_id: Option<String>,
    }

    /// Response from listing labels
    #[derive(Debug, Deserialize)]
    pub struct ListLabelsResponse {
        pub labels: Option<Vec<LabelResponse>>,
    }

    /// A single label entry
    #[derive(Debug, Deserialize)]
    pub struct LabelResponse {
        pub id: String,
        pub name: String,
        #[serde(rename = "type")]
        pub label_type: Option<String>,
    }

    /// Token response from Google
    #[derive(Debug, Deserialize)]
    pub struct TokenResponse {
        pub access_token: String,
        pub refresh_token: Option<String>,
        pub expires_in: Option<u64>,
        pub scope: Option<String>,
        #[allow(dead_code)]
        pub token_type: Option<String>,
    }
}
