//! Tool result normalization.
//!
//! Flattens the content blocks of a `tools/call` result into one display
//! string so conversation history stays text-only. Every variant, including
//! `Unsupported`, has a rendering; normalization never fails.

use sha2::{Digest, Sha256};

use super::lifecycle::floor_char_boundary;
use super::types::{CallToolResult, ContentBlock, ResourceContents};

/// Cap on the text of an embedded resource carried into history.
const RESOURCE_EXCERPT_BYTES: usize = 2000;

/// Hex digits of the payload digest shown in image placeholders.
const DIGEST_PREFIX_LEN: usize = 12;

/// A tool result reduced to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub display_text: String,
    pub is_error: bool,
}

impl CallResult {
    /// A failed call described by `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            display_text: message.into(),
            is_error: true,
        }
    }
}

impl From<CallToolResult> for CallResult {
    fn from(result: CallToolResult) -> Self {
        Self {
            display_text: normalize_content(&result.content),
            is_error: result.is_error,
        }
    }
}

/// Render content blocks in order, one per line.
///
/// An empty sequence renders as the empty string.
pub fn normalize_content(blocks: &[ContentBlock]) -> String {
    blocks.iter().map(render_block).collect::<Vec<_>>().join("\n")
}

fn render_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { text } => text.clone(),
        ContentBlock::Image { data, mime_type } => format!(
            "[image {mime_type}, {} bytes, sha256:{}]",
            base64_decoded_len(data),
            digest_prefix(data)
        ),
        ContentBlock::Resource { resource } => match resource {
            ResourceContents::Text { uri, text, .. } => {
                let cut = floor_char_boundary(text, RESOURCE_EXCERPT_BYTES);
                let ellipsis = if cut < text.len() { "..." } else { "" };
                format!("[resource {uri}]\n{}{ellipsis}\n[/resource]", &text[..cut])
            }
            ResourceContents::Blob { uri, mime_type, .. } => match mime_type {
                Some(mime) => format!("[binary resource {uri} ({mime})]"),
                None => format!("[binary resource {uri}]"),
            },
        },
        ContentBlock::Unsupported { kind } => format!("[unsupported content: {kind}]"),
    }
}

/// Size of the payload a base64 string encodes, without decoding it.
fn base64_decoded_len(data: &str) -> usize {
    let significant = data.bytes().filter(|b| !b.is_ascii_whitespace()).count();
    let padding = data.trim_end().bytes().rev().take_while(|b| *b == b'=').count();
    (significant / 4 * 3).saturating_sub(padding)
}

fn digest_prefix(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..DIGEST_PREFIX_LEN].to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ContentBlock {
        ContentBlock::Text { text: s.into() }
    }

    #[test]
    fn test_empty_content_is_empty_string() {
        assert_eq!(normalize_content(&[]), "");
    }

    #[test]
    fn test_text_blocks_join_in_order() {
        let blocks = vec![text("first"), text("second")];
        assert_eq!(normalize_content(&blocks), "first\nsecond");
    }

    #[test]
    fn test_image_placeholder_omits_payload() {
        let data = "aGVsbG8gd29ybGQ="; // "hello world"
        let out = normalize_content(&[ContentBlock::Image {
            data: data.into(),
            mime_type: "image/png".into(),
        }]);
        assert!(out.starts_with("[image image/png, 11 bytes, sha256:"));
        assert!(out.ends_with(']'));
        assert!(!out.contains(data));
    }

    #[test]
    fn test_text_resource_is_excerpted() {
        let long = "x".repeat(RESOURCE_EXCERPT_BYTES + 50);
        let out = normalize_content(&[ContentBlock::Resource {
            resource: ResourceContents::Text {
                uri: "file:///notes.txt".into(),
                mime_type: Some("text/plain".into()),
                text: long,
            },
        }]);
        assert!(out.starts_with("[resource file:///notes.txt]\n"));
        assert!(out.ends_with("...\n[/resource]"));
        assert!(out.len() < RESOURCE_EXCERPT_BYTES + 100);
    }

    #[test]
    fn test_blob_resource_references_uri_only() {
        let out = normalize_content(&[ContentBlock::Resource {
            resource: ResourceContents::Blob {
                uri: "file:///photo.jpg".into(),
                mime_type: None,
                blob: "AAAA".into(),
            },
        }]);
        assert_eq!(out, "[binary resource file:///photo.jpg]");
    }

    #[test]
    fn test_unknown_variant_becomes_marker() {
        let block = ContentBlock::from_value(serde_json::json!({"type": "audio", "data": "..."}));
        let out = normalize_content(&[text("before"), block]);
        assert_eq!(out, "before\n[unsupported content: audio]");
    }

    #[test]
    fn test_call_result_keeps_error_flag() {
        let result: CallToolResult = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "no such file"}],
            "isError": true,
        }))
        .unwrap();
        let normalized = CallResult::from(result);
        assert!(normalized.is_error);
        assert_eq!(normalized.display_text, "no such file");
    }

    #[test]
    fn test_base64_decoded_len() {
        assert_eq!(base64_decoded_len(""), 0);
        assert_eq!(base64_decoded_len("QQ=="), 1);
        assert_eq!(base64_decoded_len("QUI="), 2);
        assert_eq!(base64_decoded_len("QUJD"), 3);
    }
}
