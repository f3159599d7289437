use super::{ITEM_TAG, LIST_TAG, sanitize_tag};
use serde_json::Value;

/// Encodes a semantic tree as tagged text.
///
/// Objects become one tag per key, sequences become `item` tags nested in
/// their key's tag (or in `items` at the top level), scalars are written as
/// plain text. Numeric and boolean types are not preserved; the destination
/// schema recovers them on decode.
///
/// ```rust
/// use llm_agentkit::markup::encode;
/// use serde_json::json;
///
/// let text = encode(&json!({ "question": "why?", "tags": ["a", "b"] }));
/// assert_eq!(
///     text,
///     "<question>why?</question>\n<tags>\n<item>a</item>\n<item>b</item>\n</tags>"
/// );
/// ```
pub fn encode(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| encode_entry(key, value))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(_) => encode_entry(LIST_TAG, value),
        scalar => scalar_text(scalar),
    }
}

/// Encodes a single `key -> value` pair.
pub fn encode_entry(key: &str, value: &Value) -> String {
    let tag = sanitize_tag(key);
    match value {
        Value::Object(map) if map.is_empty() => format!("<{tag}></{tag}>"),
        Value::Object(_) => format!("<{tag}>\n{}\n</{tag}>", encode(value)),
        Value::Array(items) if items.is_empty() => format!("<{tag}></{tag}>"),
        Value::Array(items) => {
            let inner = items
                .iter()
                .map(|item| encode_entry(ITEM_TAG, item))
                .collect::<Vec<_>>()
                .join("\n");
            format!("<{tag}>\n{inner}\n</{tag}>")
        }
        scalar => format!("<{tag}>{}</{tag}>", scalar_text(scalar)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_nested_objects() {
        let value = json!({ "input": { "message": "hello", "count": 3, "urgent": true } });
        assert_eq!(
            encode(&value),
            "<input>\n<message>hello</message>\n<count>3</count>\n<urgent>true</urgent>\n</input>"
        );
    }

    #[test]
    fn test_encode_empty_containers() {
        assert_eq!(encode(&json!({ "meta": {}, "list": [] })), "<meta></meta>\n<list></list>");
    }

    #[test]
    fn test_encode_top_level_sequence_uses_default_tag() {
        assert_eq!(encode(&json!([1, 2])), "<items>\n<item>1</item>\n<item>2</item>\n</items>");
    }

    #[test]
    fn test_encode_sequence_of_objects() {
        let value = json!({ "servers": [{ "name": "search", "description": "web search" }] });
        assert_eq!(
            encode(&value),
            "<servers>\n<item>\n<name>search</name>\n<description>web search</description>\n</item>\n</servers>"
        );
    }

    #[test]
    fn test_encode_sanitizes_keys() {
        let value = json!({ "user name": "ann", "1st": "x", "ok-key": null });
        assert_eq!(
            encode(&value),
            "<user_name>ann</user_name>\n<tag_1st>x</tag_1st>\n<ok_key></ok_key>"
        );
    }

    #[test]
    fn test_encode_scalar_top_level() {
        assert_eq!(encode(&json!("plain")), "plain");
        assert_eq!(encode(&json!(4.5)), "4.5");
    }

    #[test]
    fn test_encode_is_deterministic() {
        let value = json!({ "b": [1, { "c": false }], "a": "x" });
        assert_eq!(encode(&value), encode(&value));
    }
}
