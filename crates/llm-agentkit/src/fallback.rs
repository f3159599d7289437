//! Per-field placeholder values for replies that did not yield a field.
//!
//! Every value produced here satisfies the field's declared kind, so an
//! object assembled entirely from fallbacks still passes validation for any
//! schema without array fields.

use crate::markup::ExtractedTree;
use crate::schema::{FieldKind, FieldSpec, ObjectShape};
use serde_json::{Map, Value};
use tracing::debug;

/// Placeholder for a response-like field when nothing could be recovered.
pub const RESPONSE_PLACEHOLDER: &str = "No response could be generated.";

/// Fixed sentence for reasoning fields.
pub const THINKING_PLACEHOLDER: &str = "No additional reasoning was provided.";

/// Placeholder for any other string field.
pub const GENERIC_PLACEHOLDER: &str = "Not available";

/// Texts at or below this length are not considered a usable response.
const MIN_RESPONSE_CHARS: usize = 10;

/// How much raw reply text a response field may borrow.
const RAW_EXCERPT_CHARS: usize = 200;

/// Builds fallback values from the best tree available and the raw reply.
#[derive(Debug, Clone, Copy)]
pub struct FallbackSynthesizer<'a> {
    tree: &'a ExtractedTree,
    raw: &'a str,
}

impl<'a> FallbackSynthesizer<'a> {
    pub fn new(tree: &'a ExtractedTree, raw: &'a str) -> Self {
        Self { tree, raw }
    }

    /// Synthesizes a value for one field. Rules are checked in order; the
    /// first match wins.
    pub fn synthesize(&self, field: &FieldSpec) -> Value {
        let name = field.name.to_lowercase();
        let value = match field.kind {
            FieldKind::Object => match &field.children {
                Some(children) => Value::Object(self.synthesize_object(children)),
                None => Value::Object(Map::new()),
            },
            FieldKind::String if name.contains("response") || name.contains("message") => {
                Value::String(self.response_text())
            }
            FieldKind::String if name.contains("thinking") || name.contains("comment") => {
                Value::String(THINKING_PLACEHOLDER.to_string())
            }
            FieldKind::String => Value::String(GENERIC_PLACEHOLDER.to_string()),
            FieldKind::Number => Value::from(0),
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::Array => Value::Array(Vec::new()),
        };
        debug!(field = %field.name, kind = %field.kind, "Synthesized fallback value");
        value
    }

    /// Synthesizes every field of `shape`.
    pub fn synthesize_object(&self, shape: &ObjectShape) -> Map<String, Value> {
        shape
            .fields()
            .iter()
            .map(|field| (field.name.clone(), self.synthesize(field)))
            .collect()
    }

    fn response_text(&self) -> String {
        if let Some(text) = self
            .tree
            .find_text(&|text| text.chars().count() > MIN_RESPONSE_CHARS)
        {
            return text.to_string();
        }

        let excerpt: String = self.raw.trim().chars().take(RAW_EXCERPT_CHARS).collect();
        if excerpt.is_empty() {
            RESPONSE_PLACEHOLDER.to_string()
        } else {
            excerpt
        }
    }
}
