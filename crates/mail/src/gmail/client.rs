//! Gmail API HTTP client
//!
//! Provides methods for listing and fetching messages from the Gmail API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::api::{GmailMessage, ListLabelsResponse, ListMessagesResponse, ProfileResponse};
use super::context::CredentialContext;
use super::normalize::normalize_message;
use crate::error::{Error, Result};
use crate::models::{Label, Message, MessageId, MessagePointer, Profile, ThreadId};

/// Gmail API base URL
pub(crate) const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Largest page the list endpoint accepts
const MAX_PAGE_SIZE: usize = 500;

/// Read access to a mailbox
///
/// Implemented by [`GmailClient`]; the query layer only depends on this trait.
pub trait MailApi: Send + Sync {
    /// List pointers to messages matching a provider query, in provider order
    ///
    /// Follows pagination until `max_results` pointers are collected or the
    /// result set is exhausted. An empty result is an empty Vec.
    fn list_pointers(
        &self,
        query: &str,
        max_results: usize,
        include_spam_trash: bool,
    ) -> Result<Vec<MessagePointer>>;

    /// Fetch and decode one message
    ///
    /// Fails with [`Error::NotFound`] if the message no longer exists.
    fn fetch_full(&self, id: &MessageId) -> Result<Message>;
}

/// Gmail API client
pub struct GmailClient {
    credentials: Arc<CredentialContext>,
    base_url: String,
}

impl GmailClient {
    /// Create a new Gmail client bound to a credential context
    pub fn new(credentials: Arc<CredentialContext>) -> Self {
        Self::with_base_url(credentials, GMAIL_API_BASE)
    }

    /// Create a client against another API root, e.g. a local stand-in
    pub fn with_base_url(credentials: Arc<CredentialContext>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            credentials,
            base_url,
        }
    }

    pub fn credentials(&self) -> &CredentialContext {
        &self.credentials
    }

    /// List one page of message references
    ///
    /// # Arguments
    /// * `query` - Gmail search query (may be empty)
    /// * `max_results` - Maximum number of messages to return (1-500)
    /// * `page_token` - Optional page token for pagination
    pub fn list_messages(
        &self,
        query: &str,
        max_results: usize,
        include_spam_trash: bool,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let mut url = format!(
            "{}/users/me/messages?maxResults={}",
            self.base_url,
            max_results.clamp(1, MAX_PAGE_SIZE)
        );

        if !query.is_empty() {
            url.push_str(&format!("&q={}", urlencoding::encode(query)));
        }
        if include_spam_trash {
            url.push_str("&includeSpamTrash=true");
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        self.authorized_get(&url, "list messages")
    }

    /// Get full message details by ID
    pub fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
        let url = format!(
            "{}/users/me/messages/{}?format=full",
            self.base_url,
            urlencoding::encode(id.as_str())
        );

        match self.authorized_get(&url, "get message") {
            Err(Error::Remote { status: 404, .. }) => Err(Error::NotFound(id.to_string())),
            other => other,
        }
    }

    /// Get the authenticated mailbox profile
    pub fn get_profile(&self) -> Result<Profile> {
        let url = format!("{}/users/me/profile", self.base_url);
        let profile: ProfileResponse = self.authorized_get(&url, "get profile")?;
        Ok(profile.into())
    }

    /// List all labels (folders) in the user's mailbox
    pub fn list_labels(&self) -> Result<Vec<Label>> {
        let url = format!("{}/users/me/labels", self.base_url);
        let response: ListLabelsResponse = self.authorized_get(&url, "list labels")?;

        let mut labels: Vec<Label> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| {
                let is_system = l.label_type.as_deref() == Some("system");
                Label::new(l.id, l.name, is_system)
            })
            .collect();
        labels.sort_by(|a, b| b.is_system.cmp(&a.is_system).then_with(|| a.name.cmp(&b.name)));
        Ok(labels)
    }

    /// GET with the current access token, refreshing once on a 401
    fn authorized_get<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<T> {
        let access_token = self.credentials.access_token()?;

        match get_json(url, &access_token, context) {
            Err(Error::Auth(reason)) => {
                log::warn!("{}: access token rejected, refreshing", context);
                let fresh = self
                    .credentials
                    .refresh_rejected(&access_token)
                    .map_err(|e| match e {
                        Error::Auth(_) => Error::Auth(reason),
                        other => other,
                    })?;
                get_json(url, &fresh, context)
            }
            other => other,
        }
    }
}

impl MailApi for GmailClient {
    fn list_pointers(
        &self,
        query: &str,
        max_results: usize,
        include_spam_trash: bool,
    ) -> Result<Vec<MessagePointer>> {
        let mut pointers: Vec<MessagePointer> = Vec::new();
        let mut page_token: Option<String> = None;

        while pointers.len() < max_results {
            let remaining = max_results - pointers.len();
            let response =
                self.list_messages(query, remaining, include_spam_trash, page_token.as_deref())?;

            if let Some(messages) = response.messages {
                pointers.extend(
                    messages
                        .into_iter()
                        .map(|m| MessagePointer::new(m.id, ThreadId::new(m.thread_id))),
                );
            }

            // Check for next page
            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        pointers.truncate(max_results);
        log::debug!("Query {:?} matched {} messages", query, pointers.len());
        Ok(pointers)
    }

    fn fetch_full(&self, id: &MessageId) -> Result<Message> {
        let raw = self.get_message(id)?;
        Ok(normalize_message(raw))
    }
}

/// Authenticated GET returning parsed JSON
///
/// 401 maps to [`Error::Auth`], other non-2xx to [`Error::Remote`].
pub(crate) fn get_json<T: DeserializeOwned>(
    url: &str,
    access_token: &str,
    context: &str,
) -> Result<T> {
    let mut response = ureq::get(url)
        .header("Authorization", &format!("Bearer {}", access_token))
        .call()
        .map_err(|e| Error::from_http(e, context))?;

    response
        .body_mut()
        .read_json::<T>()
        .map_err(|e| Error::Transport {
            context: context.to_string(),
            message: format!("failed to parse response: {e}"),
        })
}
