//! Text helpers shared across the relay.
//!
//! Game-server payloads are loosely typed JSON; these helpers normalize
//! them into plain strings without ever failing.

use fancy_regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Trim a string and return it only when something is left.
pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Trim, drop empties and de-duplicate while preserving order.
///
/// Used for config list fields (channel refs, recipient ids, whitelists).
pub fn uniq_texts<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let text = value.as_ref().trim();
        if text.is_empty() {
            continue;
        }
        if seen.insert(text.to_string()) {
            out.push(text.to_string());
        }
    }
    out
}

/// Extract a scalar JSON value as trimmed text; non-scalars yield "".
pub fn text_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Extract a named scalar field from a JSON object as trimmed text.
pub fn text_at(value: &Value, key: &str) -> String {
    value.get(key).map(text_field).unwrap_or_default()
}

/// Recursively collect readable text from a rich-text component tree.
///
/// Concatenates `text`, `translate` and `key` plus every element of the
/// `extra` and `with` arrays, the shape Minecraft chat components use.
pub fn walk_text(node: &Value) -> String {
    match node {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items.iter().map(walk_text).collect(),
        Value::Object(map) => {
            let mut out = String::new();
            for key in ["text", "translate", "key"] {
                if let Some(Value::String(s)) = map.get(key) {
                    out.push_str(s);
                }
            }
            for key in ["extra", "with"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    for item in items {
                        out.push_str(&walk_text(item));
                    }
                }
            }
            out
        }
    }
}

/// Best-effort plain text from a raw message that may be a JSON rich-text
/// tree, a JSON string of one, or already plain text.
pub fn plain_raw(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => {
            let text = s.trim();
            if !text.starts_with('{') && !text.starts_with('[') {
                return s.clone();
            }
            match serde_json::from_str::<Value>(text) {
                Ok(parsed) => {
                    let plain = walk_text(&parsed);
                    if plain.is_empty() {
                        s.clone()
                    } else {
                        plain
                    }
                }
                Err(_) => s.clone(),
            }
        }
        other => walk_text(other),
    }
}

/// Result of splitting CICode image markup out of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageParts {
    /// Message text with the image markup removed.
    pub text: String,
    /// Image url, when markup was present.
    pub url: Option<String>,
}

fn image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[\[CICode,.*?url=([^,\]]+).*?\]\]").expect("valid image pattern")
    })
}

/// Extract an embedded `[[CICode,...url=...]]` image reference.
pub fn extract_image(text: &str) -> ImageParts {
    let re = image_regex();
    match re.captures(text) {
        Ok(Some(caps)) => {
            let url = caps.get(1).map(|m| m.as_str().to_string());
            let stripped = re.replace(text, "").trim().to_string();
            ImageParts {
                text: stripped,
                url,
            }
        }
        _ => ImageParts {
            text: text.to_string(),
            url: None,
        },
    }
}

/// A channel reference, optionally qualified with a platform name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub platform: Option<String>,
    pub channel_id: String,
}

/// Parse a channel ref in either `platform:channelId` or bare `channelId`
/// form. The split happens at the last colon.
pub fn parse_channel_ref(raw: &str) -> ChannelRef {
    let value = raw.trim();
    match value.rfind(':') {
        Some(idx) => ChannelRef {
            platform: Some(value[..idx].to_string()),
            channel_id: value[idx + 1..].to_string(),
        },
        None => ChannelRef {
            platform: None,
            channel_id: value.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  hi  "), Some("hi"));
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(""), None);
    }

    #[test]
    fn test_uniq_texts_dedupes_and_trims() {
        let out = uniq_texts(["a", " b ", "", "a", "b"]);
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_walk_text_rich_tree() {
        let node = json!({
            "text": "hello ",
            "extra": [{"text": "world"}, {"translate": "!", "with": [{"text": "?"}]}]
        });
        assert_eq!(walk_text(&node), "hello world!?");
    }

    #[test]
    fn test_plain_raw_json_string() {
        let raw = json!(r#"{"text":"a","extra":[{"text":"b"}]}"#);
        assert_eq!(plain_raw(&raw), "ab");
    }

    #[test]
    fn test_plain_raw_passthrough() {
        assert_eq!(plain_raw(&json!("just text")), "just text");
        // Unparseable JSON-looking text falls back to the original
        assert_eq!(plain_raw(&json!("{broken")), "{broken");
    }

    #[test]
    fn test_extract_image() {
        let parts = extract_image("look [[CICode,url=http://x/y.png,name=pic]] here");
        assert_eq!(parts.url.as_deref(), Some("http://x/y.png"));
        assert_eq!(parts.text, "look  here".trim());

        let parts = extract_image("no image");
        assert_eq!(parts.url, None);
        assert_eq!(parts.text, "no image");
    }

    #[test]
    fn test_parse_channel_ref() {
        let qualified = parse_channel_ref("discord:12345");
        assert_eq!(qualified.platform.as_deref(), Some("discord"));
        assert_eq!(qualified.channel_id, "12345");

        let bare = parse_channel_ref("12345");
        assert_eq!(bare.platform, None);
        assert_eq!(bare.channel_id, "12345");

        // Split happens at the last colon
        let nested = parse_channel_ref("sandbox:abc:#");
        assert_eq!(nested.platform.as_deref(), Some("sandbox:abc"));
        assert_eq!(nested.channel_id, "#");
    }
}
