//! Conversion of extracted text into the kind a schema field expects.
//!
//! Coercion never fails: a value that cannot be converted is passed through
//! as its original text and a warning is logged. Schema validation decides
//! later whether that is acceptable.

use crate::markup::{ExtractedTree, ExtractedValue};
use crate::schema::{FieldKind, FieldSpec, ObjectShape};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use tracing::warn;

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Converts raw text to `kind`.
///
/// ```rust
/// use llm_agentkit::coerce::coerce_text;
/// use llm_agentkit::schema::FieldKind;
/// use serde_json::json;
///
/// assert_eq!(coerce_text("$1,250.50", FieldKind::Number), json!(1250.5));
/// assert_eq!(coerce_text(" TRUE ", FieldKind::Boolean), json!(true));
/// assert_eq!(coerce_text("  hi  ", FieldKind::String), json!("hi"));
/// assert_eq!(coerce_text("n/a", FieldKind::Number), json!("n/a"));
/// ```
pub fn coerce_text(raw: &str, kind: FieldKind) -> Value {
    match kind {
        FieldKind::String => Value::String(raw.trim().to_string()),
        FieldKind::Number => coerce_number(raw),
        FieldKind::Boolean => Value::Bool(raw.trim().eq_ignore_ascii_case("true")),
        FieldKind::Object => match serde_json::from_str::<Value>(raw.trim()) {
            Ok(object @ Value::Object(_)) => object,
            _ => {
                warn!(raw, "Could not coerce text to an object, keeping text");
                Value::String(raw.to_string())
            }
        },
        FieldKind::Array => match serde_json::from_str::<Value>(raw.trim()) {
            Ok(array @ Value::Array(_)) => array,
            _ => Value::Array(vec![Value::String(raw.trim().to_string())]),
        },
    }
}

/// Converts one extracted value to the field's kind.
///
/// Returns `None` when a nested tree meets a scalar kind that cannot hold it.
pub fn coerce_value(value: &ExtractedValue, field: &FieldSpec) -> Option<Value> {
    match (field.kind, value) {
        (FieldKind::String, value) => Some(Value::String(value.to_text().trim().to_string())),
        (FieldKind::Number, ExtractedValue::Number(number)) => Some(Value::Number(number.clone())),
        (FieldKind::Boolean, ExtractedValue::Bool(flag)) => Some(Value::Bool(*flag)),
        (FieldKind::Object, ExtractedValue::Tree(tree)) => {
            Some(Value::Object(coerce_tree(tree, field.children.as_ref())))
        }
        (FieldKind::Array, ExtractedValue::Tree(tree)) => {
            Some(coerce_sequence(tree, field.items.as_deref()))
        }
        (FieldKind::Array, scalar) => match field.items.as_deref() {
            Some(items) => coerce_value(scalar, items).map(|item| Value::Array(vec![item])),
            None => Some(coerce_text(&scalar.to_text(), FieldKind::Array)),
        },
        (_, ExtractedValue::Tree(_)) => None,
        (kind, scalar) => Some(coerce_text(&scalar.to_text(), kind)),
    }
}

/// Converts a tree to a JSON object, coercing keys the shape declares.
///
/// Repeated keys become arrays; undeclared keys keep their decoded form.
pub fn coerce_tree(tree: &ExtractedTree, shape: Option<&ObjectShape>) -> Map<String, Value> {
    let mut seen = HashSet::new();
    let mut map = Map::new();

    for (key, _) in tree.iter() {
        if !seen.insert(key) {
            continue;
        }
        let field = shape.and_then(|shape| shape.field(key));
        let values: Vec<&ExtractedValue> = tree.get_all(key).collect();

        let coerced = match values.as_slice() {
            [single] => coerce_or_keep(single, field),
            many => {
                let element = field.and_then(|f| f.items.as_deref().or(Some(f)));
                Value::Array(many.iter().map(|v| coerce_or_keep(v, element)).collect())
            }
        };
        map.insert(key.to_string(), coerced);
    }
    map
}

fn coerce_sequence(tree: &ExtractedTree, items: Option<&FieldSpec>) -> Value {
    Value::Array(tree.values().map(|value| coerce_or_keep(value, items)).collect())
}

fn coerce_or_keep(value: &ExtractedValue, field: Option<&FieldSpec>) -> Value {
    field
        .and_then(|field| coerce_value(value, field))
        .unwrap_or_else(|| value.to_json())
}

fn coerce_number(raw: &str) -> Value {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    match digits.parse::<f64>().ok().and_then(number_from_f64) {
        Some(number) => Value::Number(number),
        None => {
            warn!(raw, "Could not coerce text to a number, keeping text");
            Value::String(raw.to_string())
        }
    }
}

/// Integral values become integers so they satisfy `integer` schemas.
pub(crate) fn number_from_f64(value: f64) -> Option<Number> {
    if value.fract() == 0.0 && value.abs() < MAX_SAFE_INTEGER {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}
