//! Tagged-text codec used both to embed context into prompts and to read
//! completion replies back.
//!
//! # Examples
//!
//! ```rust
//! use llm_agentkit::markup::{decode, encode};
//! use serde_json::json;
//!
//! let prompt = encode(&json!({ "input": { "message": "hi" } }));
//! assert_eq!(prompt, "<input>\n<message>hi</message>\n</input>");
//!
//! let tree = decode(&prompt);
//! assert_eq!(tree.to_json(), json!({ "input": { "message": "hi" } }));
//! ```
//!
//! # Tag names
//!
//! Keys are sanitized to `[A-Za-z0-9_]`: any other character becomes `_`, and
//! names that do not start with an ASCII letter get the `tag_` prefix.

pub mod decode;
pub mod encode;
pub mod tree;

pub use self::decode::decode;
pub use self::encode::{encode, encode_entry};
pub use self::tree::{ExtractedTree, ExtractedValue};

/// Tag wrapping each element of a sequence.
pub const ITEM_TAG: &str = "item";

/// Tag wrapping a sequence encoded at the top level.
pub const LIST_TAG: &str = "items";

/// Key under which salvaged prose is returned, and the wrapper replies are
/// asked to use.
pub const RESPONSE_KEY: &str = "response";

/// Prefix for tag names that do not start with a letter.
pub const TAG_PREFIX: &str = "tag_";

/// Maps an arbitrary key to a legal tag name.
pub fn sanitize_tag(name: &str) -> String {
    let mut tag: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !tag.starts_with(|c: char| c.is_ascii_alphabetic()) {
        tag.insert_str(0, TAG_PREFIX);
    }
    tag
}
