use super::RESPONSE_KEY;
use super::tree::{ExtractedTree, ExtractedValue};
use regex::Regex;
use serde_json::Number;
use std::sync::LazyLock;
use tracing::{debug, warn};

static OPEN_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_.:\-]*)(?:\s[^<>]*)?>").ok());

static PLAIN_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").ok());

/// Decodes a completion reply into an [`ExtractedTree`]. Never fails.
///
/// Tags are matched best-effort: each opening tag is paired with the nearest
/// following closing tag of the same name, and unpaired openings are skipped.
/// When the reply holds no tags at all, its prose is returned under
/// `response`; when nothing is left, the tree is empty.
///
/// ```rust
/// use llm_agentkit::markup::{decode, ExtractedValue};
///
/// let tree = decode("Sure!\n<answer>42</answer>\n<done>true</done>");
/// assert_eq!(tree.get("answer"), Some(&ExtractedValue::Number(42.into())));
/// assert_eq!(tree.get("done"), Some(&ExtractedValue::Bool(true)));
///
/// let prose = decode("no tags here at all");
/// assert_eq!(prose.get("response").and_then(|v| v.as_text()), Some("no tags here at all"));
/// ```
pub fn decode(text: &str) -> ExtractedTree {
    let tree = scan(text);
    if !tree.is_empty() {
        return tree;
    }

    if let Some(prose) = salvage_prose(text) {
        debug!(chars = prose.len(), "No tags in reply, salvaged prose");
        return ExtractedTree::new().with(RESPONSE_KEY, ExtractedValue::Text(prose));
    }

    warn!(chars = text.len(), "Reply contained neither tags nor prose");
    ExtractedTree::new()
}

fn scan(text: &str) -> ExtractedTree {
    let mut tree = ExtractedTree::new();
    let Some(open_tag) = OPEN_TAG.as_ref() else {
        return tree;
    };

    let mut cursor = 0;
    while let Some(captures) = open_tag.captures_at(text, cursor) {
        let (Some(opening), Some(name)) = (captures.get(0), captures.get(1)) else {
            break;
        };
        let closing = format!("</{}>", name.as_str());
        let content_start = opening.end();

        match text[content_start..].find(&closing) {
            Some(offset) => {
                let content = &text[content_start..content_start + offset];
                tree.push(name.as_str(), decode_content(content));
                cursor = content_start + offset + closing.len();
            }
            None => cursor = content_start,
        }
    }
    tree
}

fn decode_content(content: &str) -> ExtractedValue {
    if content.contains('<') {
        let nested = scan(content);
        if !nested.is_empty() {
            return ExtractedValue::Tree(nested);
        }
    }
    parse_scalar(content.trim())
}

fn parse_scalar(text: &str) -> ExtractedValue {
    match text {
        "true" => ExtractedValue::Bool(true),
        "false" => ExtractedValue::Bool(false),
        _ => {
            if let Some(pattern) = PLAIN_NUMBER.as_ref()
                && pattern.is_match(text)
                && let Ok(number) = serde_json::from_str::<Number>(text)
            {
                return ExtractedValue::Number(number);
            }
            ExtractedValue::Text(text.to_string())
        }
    }
}

/// Recovers untagged prose, preferring the span between the first `<` and
/// the last `>`.
fn salvage_prose(text: &str) -> Option<String> {
    let bracketed = match (text.find('<'), text.rfind('>')) {
        (Some(start), Some(end)) if start < end => strip_tags(&text[start..=end]),
        _ => String::new(),
    };
    let prose = if bracketed.is_empty() {
        strip_tags(text)
    } else {
        bracketed
    };
    (!prose.is_empty()).then_some(prose)
}

fn strip_tags(text: &str) -> String {
    text.split('<')
        .enumerate()
        .map(|(index, segment)| match segment.find('>') {
            Some(end) if index > 0 => &segment[end + 1..],
            _ => segment,
        })
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> ExtractedValue {
        ExtractedValue::Text(value.to_string())
    }

    #[test]
    fn test_decode_flat_tags_with_scalar_conversion() {
        let tree = decode("<name> Ada </name><age>36</age><ratio>-0.5</ratio><ok>false</ok>");
        assert_eq!(tree.get("name"), Some(&text("Ada")));
        assert_eq!(tree.get("age"), Some(&ExtractedValue::Number(36.into())));
        assert_eq!(
            tree.get("ratio").map(ExtractedValue::to_text),
            Some("-0.5".to_string())
        );
        assert_eq!(tree.get("ok"), Some(&ExtractedValue::Bool(false)));
    }

    #[test]
    fn test_decode_nested_tags() {
        let tree = decode("<response>\n  <names>\n    <item>a</item>\n    <item>b</item>\n  </names>\n</response>");
        let names = tree.get_tree("response").and_then(|r| r.get_tree("names")).unwrap();
        let values: Vec<_> = names.get_all("item").map(ExtractedValue::to_text).collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_decode_ignores_surrounding_prose_and_fences() {
        let reply = "Here you go:\n```xml\n<answer>Paris</answer>\n```\nHope it helps.";
        let tree = decode(reply);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get("answer"), Some(&text("Paris")));
    }

    #[test]
    fn test_decode_skips_unclosed_openings() {
        let tree = decode("<response>\n<answer>yes</answer>");
        assert_eq!(tree.get("response"), None);
        assert_eq!(tree.get("answer"), Some(&text("yes")));
    }

    #[test]
    fn test_decode_text_with_angle_bracket_stays_text() {
        let tree = decode("<expr>3 < 5</expr>");
        assert_eq!(tree.get("expr"), Some(&text("3 < 5")));
    }

    #[test]
    fn test_decode_attributes_on_opening_tag() {
        let tree = decode(r#"<answer lang="en">hi</answer>"#);
        assert_eq!(tree.get("answer"), Some(&text("hi")));
    }

    #[test]
    fn test_decode_leading_zero_stays_text() {
        let tree = decode("<code>007</code>");
        assert_eq!(tree.get("code"), Some(&text("007")));
    }

    #[test]
    fn test_salvage_plain_prose() {
        let tree = decode("no tags here at all");
        assert_eq!(tree.get(RESPONSE_KEY), Some(&text("no tags here at all")));
    }

    #[test]
    fn test_salvage_broken_tags() {
        let tree = decode("<answer>The capital is Paris<answer>");
        assert_eq!(tree.get(RESPONSE_KEY), Some(&text("The capital is Paris")));
    }

    #[test]
    fn test_decode_is_total() {
        for input in ["", "   ", "<", ">", "<>", "</a>", "<a>", "<<>>", "plain", "<a><b></a></b>"] {
            let _ = decode(input);
        }
        assert!(decode("").is_empty());
        assert!(decode("  <> ").is_empty());
    }
}
