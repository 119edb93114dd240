//! Gmail API response normalization
//!
//! Converts Gmail API responses to domain messages.

use chrono::{DateTime, TimeZone, Utc};

use super::api::{GmailMessage, MessagePayload};
use super::decode::{ContentNode, decode_body};
use crate::models::{Message, MessageId, ThreadId};

/// Normalize a Gmail API message to a domain Message
///
/// Missing headers fall back to fixed literals; a message without a payload
/// yields an empty body.
pub fn normalize_message(gmail_msg: GmailMessage) -> Message {
    let id = MessageId::new(&gmail_msg.id);
    let thread_id = ThreadId::new(&gmail_msg.thread_id);
    let payload = gmail_msg.payload.as_ref();

    let header = |name: &str| payload.and_then(|p| extract_header(p, name));

    let date = normalize_date(header("Date").as_deref(), gmail_msg.internal_date.as_deref());
    let body = payload
        .map(|p| decode_body(&ContentNode::from(p)))
        .unwrap_or_default();

    let mut builder = Message::builder(id, thread_id)
        .snippet(decode_html_entities(&gmail_msg.snippet))
        .body(body)
        .labels(gmail_msg.label_ids.unwrap_or_default());

    if let Some(subject) = header("Subject").filter(|s| !s.trim().is_empty()) {
        builder = builder.subject(subject);
    }
    if let Some(from) = header("From") {
        builder = builder.from(from);
    }
    if let Some(to) = header("To") {
        builder = builder.to(to);
    }
    if let Some(date) = date {
        builder = builder.date(date);
    }

    builder.build()
}

/// Extract a header value by name
fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Render the message date as RFC 3339
///
/// Prefers the `Date` header, then Gmail's internal date (milliseconds since
/// epoch). An unparseable header is kept verbatim rather than dropped.
fn normalize_date(header: Option<&str>, internal_date: Option<&str>) -> Option<String> {
    if let Some(raw) = header.map(str::trim).filter(|s| !s.is_empty()) {
        if let Ok(parsed) = DateTime::parse_from_rfc2822(strip_zone_comment(raw)) {
            return Some(parsed.to_rfc3339());
        }
        if let Some(from_internal) = internal_date.and_then(internal_to_rfc3339) {
            return Some(from_internal);
        }
        return Some(raw.to_string());
    }
    internal_date.and_then(internal_to_rfc3339)
}

fn internal_to_rfc3339(millis: &str) -> Option<String> {
    let millis: i64 = millis.parse().ok()?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.to_rfc3339())
}

/// Drop a trailing "(UTC)"-style comment that RFC 2822 parsing rejects
fn strip_zone_comment(raw: &str) -> &str {
    match raw.rfind(" (") {
        Some(idx) if raw.ends_with(')') => raw[..idx].trim_end(),
        _ => raw,
    }
}

/// Decode HTML entities in snippet text
///
/// `&amp;` goes last so an escaped entity such as `&amp;lt;` decodes once.
fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
