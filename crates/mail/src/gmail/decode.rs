//! Multipart body decoding
//!
//! A message payload is a tree of MIME parts. Decoding walks the tree
//! depth-first in part order and selects the body text:
//! - every `text/plain` leaf contributes
//! - `text/html` leaves contribute only when no `text/plain` leaf has text
//! - any other leaf (attachments, images) is skipped
//!
//! A payload without sub-parts is decoded directly whatever its type.

use base64::prelude::*;

use super::api::{MessageBody, MessagePart, MessagePayload};

/// One node of a message's content tree
#[derive(Debug, Clone, PartialEq)]
pub enum ContentNode {
    /// A part carrying (possibly absent) base64 body data
    Leaf {
        mime_type: String,
        data: Option<String>,
    },
    /// A container whose children are kept in document order
    Multipart {
        mime_type: String,
        parts: Vec<ContentNode>,
    },
}

impl ContentNode {
    pub fn leaf(mime_type: impl Into<String>, data: Option<String>) -> Self {
        Self::Leaf {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn multipart(mime_type: impl Into<String>, parts: Vec<ContentNode>) -> Self {
        Self::Multipart {
            mime_type: mime_type.into(),
            parts,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Self::Leaf { mime_type, .. } | Self::Multipart { mime_type, .. } => mime_type,
        }
    }

    fn build(
        mime_type: Option<&String>,
        body: Option<&MessageBody>,
        parts: Option<&Vec<MessagePart>>,
    ) -> Self {
        let mime_type = mime_type.cloned().unwrap_or_default();
        match parts {
            Some(parts) => Self::Multipart {
                mime_type,
                parts: parts.iter().map(ContentNode::from).collect(),
            },
            None => Self::Leaf {
                mime_type,
                data: body.and_then(|b| b.data.clone()),
            },
        }
    }
}

impl From<&MessagePayload> for ContentNode {
    fn from(payload: &MessagePayload) -> Self {
        Self::build(
            payload.mime_type.as_ref(),
            payload.body.as_ref(),
            payload.parts.as_ref(),
        )
    }
}

impl From<&MessagePart> for ContentNode {
    fn from(part: &MessagePart) -> Self {
        Self::build(part.mime_type.as_ref(), part.body.as_ref(), part.parts.as_ref())
    }
}

/// Accumulated text while walking the tree
#[derive(Default)]
struct BodyText {
    plain: String,
    html: String,
    saw_plain: bool,
}

/// Decode the body text of a content tree
///
/// Never fails: an empty or attachment-only tree yields an empty string.
pub fn decode_body(root: &ContentNode) -> String {
    match root {
        ContentNode::Leaf { data, .. } => data
            .as_deref()
            .and_then(decode_base64_body)
            .unwrap_or_default(),
        ContentNode::Multipart { parts, .. } => {
            let mut text = BodyText::default();
            for part in parts {
                collect(part, &mut text);
            }
            if text.saw_plain { text.plain } else { text.html }
        }
    }
}

fn collect(node: &ContentNode, text: &mut BodyText) {
    match node {
        ContentNode::Multipart { parts, .. } => {
            for part in parts {
                collect(part, text);
            }
        }
        ContentNode::Leaf { mime_type, data } => {
            if is_mime(mime_type, "text/plain") {
                // An empty plain part does not shadow the html alternative
                if let Some(decoded) = data.as_deref().and_then(decode_base64_body)
                    && !decoded.is_empty()
                {
                    text.saw_plain = true;
                    text.plain.push_str(&decoded);
                }
            } else if is_mime(mime_type, "text/html") && !text.saw_plain {
                if let Some(decoded) = data.as_deref().and_then(decode_base64_body) {
                    text.html.push_str(&decoded);
                }
            }
        }
    }
}

/// Compare a declared MIME type (possibly with parameters) against an essence
fn is_mime(declared: &str, essence: &str) -> bool {
    declared
        .split(';')
        .next()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case(essence))
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, and relayed content may
/// use the standard alphabet with line breaks, so we try multiple decoders.
pub fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Some(String::new());
    }

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(&compact) {
            return Some(match String::from_utf8(decoded) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            });
        }
    }

    log::debug!("Body data is not valid base64 ({} bytes)", compact.len());
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> Option<String> {
        Some(BASE64_URL_SAFE_NO_PAD.encode(s))
    }

    fn plain(s: &str) -> ContentNode {
        ContentNode::leaf("text/plain; charset=UTF-8", b64(s))
    }

    fn html(s: &str) -> ContentNode {
        ContentNode::leaf("text/html", b64(s))
    }

    #[test]
    fn test_decode_base64_body() {
        // "Hello, World!" in base64url
        let encoded = "SGVsbG8sIFdvcmxkIQ";
        let decoded = decode_base64_body(encoded);
        assert_eq!(decoded, Some("Hello, World!".to_string()));
    }

    #[test]
    fn test_decode_base64_variants() {
        // Standard alphabet, padded, wrapped across lines
        assert_eq!(
            decode_base64_body("SGVsbG8s\r\nIFdvcmxkIQ=="),
            Some("Hello, World!".to_string())
        );
        // URL-safe alphabet: "??>" encodes with '-' and '_' characters
        let url_safe = BASE64_URL_SAFE_NO_PAD.encode("subject??>ok");
        assert_eq!(
            decode_base64_body(&url_safe),
            Some("subject??>ok".to_string())
        );
        assert_eq!(decode_base64_body("***"), None);
    }

    #[test]
    fn test_single_part_decoded_regardless_of_type() {
        let root = ContentNode::leaf("text/html", b64("<p>Hi</p>"));
        assert_eq!(decode_body(&root), "<p>Hi</p>");

        let root = ContentNode::leaf("application/octet-stream", b64("raw"));
        assert_eq!(decode_body(&root), "raw");
    }

    #[test]
    fn test_plain_preferred_over_html() {
        let root = ContentNode::multipart(
            "multipart/alternative",
            vec![plain("Plain body"), html("<b>Html body</b>")],
        );
        assert_eq!(decode_body(&root), "Plain body");
    }

    #[test]
    fn test_html_before_plain_does_not_contribute() {
        let root = ContentNode::multipart(
            "multipart/mixed",
            vec![
                html("<b>first</b>"),
                ContentNode::multipart("multipart/alternative", vec![plain("one ")]),
                html("<i>later</i>"),
                plain("two"),
            ],
        );
        assert_eq!(decode_body(&root), "one two");
    }

    #[test]
    fn test_empty_plain_part_keeps_html() {
        let root = ContentNode::multipart(
            "multipart/alternative",
            vec![
                ContentNode::leaf("text/plain", None),
                html("<p>S/ 25.90 BCP en TAMBO.</p>"),
                plain(""),
            ],
        );
        assert_eq!(decode_body(&root), "<p>S/ 25.90 BCP en TAMBO.</p>");
    }

    #[test]
    fn test_html_only_concatenated_in_order() {
        let root = ContentNode::multipart(
            "multipart/related",
            vec![
                html("<p>a</p>"),
                ContentNode::multipart("multipart/alternative", vec![html("<p>b</p>")]),
                ContentNode::leaf("image/png", b64("png-bytes")),
            ],
        );
        assert_eq!(decode_body(&root), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_attachment_only_tree_is_empty() {
        let root = ContentNode::multipart(
            "multipart/mixed",
            vec![
                ContentNode::leaf("application/pdf", None),
                ContentNode::leaf("image/jpeg", b64("jpeg")),
            ],
        );
        assert_eq!(decode_body(&root), "");
        assert_eq!(decode_body(&ContentNode::multipart("multipart/mixed", vec![])), "");
    }

    #[test]
    fn test_from_payload() {
        let payload = MessagePayload {
            headers: None,
            body: Some(MessageBody { data: None }),
            parts: Some(vec![MessagePart {
                mime_type: Some("text/plain".to_string()),
                body: Some(MessageBody { data: b64("hello") }),
                parts: None,
            }]),
            mime_type: Some("multipart/alternative".to_string()),
        };

        let node = ContentNode::from(&payload);
        assert_eq!(node.mime_type(), "multipart/alternative");
        assert_eq!(decode_body(&node), "hello");
    }
}
