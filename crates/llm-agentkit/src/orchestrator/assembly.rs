//! Assembly of the output object from a decoded reply.
//!
//! Each declared field is looked up by cascade: the top level of the reply,
//! then one level under a `response` wrapper, then one level under whatever
//! tag the reply opened with. A top-level string field whose tag was opened
//! but never closed keeps the text that arrived. Fields still missing are
//! synthesized.

use crate::coerce::coerce_value;
use crate::fallback::FallbackSynthesizer;
use crate::markup::{ExtractedTree, ExtractedValue, RESPONSE_KEY, sanitize_tag};
use crate::schema::{FieldKind, FieldSpec, ObjectShape};
use serde_json::{Map, Value};
use tracing::debug;

/// The assembled object plus the dotted paths of fields that were synthesized.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub output: Map<String, Value>,
    pub synthesized: Vec<String>,
}

/// Builds a value for every field of `shape`. Never leaves a field out.
pub fn assemble(tree: &ExtractedTree, raw: &str, shape: &ObjectShape) -> Assembled {
    let synthesizer = FallbackSynthesizer::new(tree, raw);
    let mut assembled = Assembled {
        output: Map::new(),
        synthesized: Vec::new(),
    };
    let mut level = Level {
        synthesizer: &synthesizer,
        raw,
        synthesized: &mut assembled.synthesized,
    };
    level.assemble(tree, shape, "", &mut assembled.output);
    assembled
}

struct Level<'a, 's> {
    synthesizer: &'a FallbackSynthesizer<'a>,
    raw: &'a str,
    synthesized: &'s mut Vec<String>,
}

impl Level<'_, '_> {
    fn assemble(
        &mut self,
        tree: &ExtractedTree,
        shape: &ObjectShape,
        prefix: &str,
        output: &mut Map<String, Value>,
    ) {
        for field in shape.fields() {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{prefix}.{}", field.name)
            };

            let resolved = candidates(tree, field).into_iter().find_map(|value| match (field.kind, value) {
                (FieldKind::Object, ExtractedValue::Tree(nested)) => match &field.children {
                    Some(children) => {
                        let mut object = Map::new();
                        self.assemble(nested, children, &path, &mut object);
                        Some(Value::Object(object))
                    }
                    None => coerce_value(value, field),
                },
                (FieldKind::Object, _) => coerce_value(value, field).filter(Value::is_object),
                _ => coerce_value(value, field),
            });

            let resolved = resolved.or_else(|| match (prefix.is_empty(), field.kind) {
                (true, FieldKind::String) => {
                    let text = unclosed_text(self.raw, &sanitize_tag(&field.name))?;
                    debug!(field = %path, "Field tag was never closed, keeping partial text");
                    Some(Value::String(text))
                }
                _ => None,
            });

            let value = match resolved {
                Some(value) => value,
                None => {
                    debug!(field = %path, "Field not found in reply, synthesizing");
                    let value = self.synthesizer.synthesize(field);
                    self.synthesized.push(path);
                    value
                }
            };
            output.insert(field.name.clone(), value);
        }
    }
}

/// Text after an opening `<tag>` that has no closing tag, up to the next `<`.
fn unclosed_text(raw: &str, tag: &str) -> Option<String> {
    let opening = format!("<{tag}>");
    let start = raw.find(&opening)? + opening.len();
    let rest = &raw[start..];
    if rest.contains(&format!("</{tag}>")) {
        return None;
    }
    let content = rest.find('<').map_or(rest, |at| &rest[..at]).trim();
    (!content.is_empty()).then(|| content.to_string())
}

/// Values for `field` in cascade order.
fn candidates<'t>(tree: &'t ExtractedTree, field: &FieldSpec) -> Vec<&'t ExtractedValue> {
    let tag = sanitize_tag(&field.name);
    let lookup = |level: &'t ExtractedTree| level.get(&field.name).or_else(|| level.get(&tag));

    let mut found = Vec::new();
    found.extend(lookup(tree));
    found.extend(tree.get_tree(RESPONSE_KEY).and_then(lookup));
    if let Some((_, ExtractedValue::Tree(first))) = tree.first() {
        found.extend(lookup(first));
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::GENERIC_PLACEHOLDER;
    use crate::markup::decode;
    use crate::schema::SchemaDescriptor;
    use serde_json::json;

    fn answer_shape() -> ObjectShape {
        ObjectShape::new(vec![FieldSpec::new("answer", FieldKind::String)])
    }

    #[test]
    fn test_direct_match() {
        let reply = "<answer>42</answer>";
        let assembled = assemble(&decode(reply), reply, &answer_shape());
        assert_eq!(Value::Object(assembled.output), json!({ "answer": "42" }));
        assert!(assembled.synthesized.is_empty());
    }

    #[test]
    fn test_response_wrapper_match() {
        let reply = "<response><answer>Paris</answer></response>";
        let assembled = assemble(&decode(reply), reply, &answer_shape());
        assert_eq!(assembled.output["answer"], json!("Paris"));
    }

    #[test]
    fn test_first_key_wrapper_match() {
        let reply = "<result>\n<answer>Paris</answer>\n</result>";
        let assembled = assemble(&decode(reply), reply, &answer_shape());
        assert_eq!(assembled.output["answer"], json!("Paris"));
    }

    #[test]
    fn test_prose_reply_falls_through_to_placeholder() {
        let reply = "no tags here at all";
        let tree = decode(reply);
        assert_eq!(tree.to_json(), json!({ "response": "no tags here at all" }));

        let assembled = assemble(&tree, reply, &answer_shape());
        assert_eq!(assembled.output["answer"], json!(GENERIC_PLACEHOLDER));
        assert_eq!(assembled.synthesized, vec!["answer".to_string()]);
    }

    #[test]
    fn test_every_declared_field_is_present() {
        let schema = SchemaDescriptor::from_value(json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "score": { "type": "number" },
                "approved": { "type": "boolean" },
                "details": {
                    "type": "object",
                    "properties": {
                        "reviewer_comment": { "type": "string" },
                        "rounds": { "type": "integer" }
                    }
                }
            }
        }))
        .unwrap();

        let reply = "<score>about 7.5</score><details><rounds>2</rounds></details>";
        let assembled = assemble(&decode(reply), reply, schema.shape());

        for field in schema.fields() {
            assert!(assembled.output.contains_key(&field.name), "missing {}", field.name);
        }
        assert_eq!(assembled.output["score"], json!(7.5));
        assert_eq!(assembled.output["details"]["rounds"], json!(2));
        assert!(assembled.output["details"]["reviewer_comment"].is_string());
        assert_eq!(
            assembled.synthesized,
            vec!["summary", "approved", "details.reviewer_comment"]
        );
    }

    #[test]
    fn test_nested_tree_for_scalar_field_is_skipped() {
        let reply = "<answer><p>x</p></answer>";
        let shape = ObjectShape::new(vec![FieldSpec::new("answer", FieldKind::Number)]);
        let assembled = assemble(&decode(reply), reply, &shape);
        assert_eq!(assembled.output["answer"], json!(0));
    }

    #[test]
    fn test_unclosed_top_level_tag_keeps_partial_text() {
        let reply = "<answer>The capital of Norway is";
        let assembled = assemble(&decode(reply), reply, &answer_shape());
        assert_eq!(assembled.output["answer"], json!("The capital of Norway is"));
        assert!(assembled.synthesized.is_empty());

        let reply = "<answer>Oslo, probably</ans";
        let assembled = assemble(&decode(reply), reply, &answer_shape());
        assert_eq!(assembled.output["answer"], json!("Oslo, probably"));
    }

    #[test]
    fn test_unclosed_tag_is_ignored_for_non_string_fields() {
        let reply = "<answer>12";
        let shape = ObjectShape::new(vec![FieldSpec::new("answer", FieldKind::Number)]);
        let assembled = assemble(&decode(reply), reply, &shape);
        assert_eq!(assembled.output["answer"], json!(0));
        assert_eq!(assembled.synthesized, vec!["answer".to_string()]);
    }

    #[test]
    fn test_sanitized_tag_is_found() {
        let reply = "<final_answer>yes</final_answer>";
        let shape = ObjectShape::new(vec![FieldSpec::new("final answer", FieldKind::String)]);
        let assembled = assemble(&decode(reply), reply, &shape);
        assert_eq!(assembled.output["final answer"], json!("yes"));
    }
}
