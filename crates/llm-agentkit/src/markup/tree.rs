use serde_json::{Map, Number, Value};

/// A value found between a pair of tags.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    Text(String),
    Number(Number),
    Bool(bool),
    Tree(ExtractedTree),
}

impl ExtractedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExtractedValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&ExtractedTree> {
        match self {
            ExtractedValue::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    /// Renders the value as text. Nested trees are re-encoded as markup.
    pub fn to_text(&self) -> String {
        match self {
            ExtractedValue::Text(text) => text.clone(),
            ExtractedValue::Number(number) => number.to_string(),
            ExtractedValue::Bool(flag) => flag.to_string(),
            ExtractedValue::Tree(tree) => tree.to_markup(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ExtractedValue::Text(text) => Value::String(text.clone()),
            ExtractedValue::Number(number) => Value::Number(number.clone()),
            ExtractedValue::Bool(flag) => Value::Bool(*flag),
            ExtractedValue::Tree(tree) => tree.to_json(),
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => ExtractedValue::Tree(ExtractedTree::from_json(value)),
            Value::String(text) => ExtractedValue::Text(text.clone()),
            Value::Number(number) => ExtractedValue::Number(number.clone()),
            Value::Bool(flag) => ExtractedValue::Bool(*flag),
            Value::Null => ExtractedValue::Text(String::new()),
        }
    }
}

/// The decoded form of a tagged reply: tag names mapped to scalars or nested
/// trees, in the order they appeared.
///
/// Repeated tags are kept; [`get`](Self::get) returns the first occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedTree {
    entries: Vec<(String, ExtractedValue)>,
}

impl ExtractedTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: ExtractedValue) {
        self.entries.push((key.into(), value));
    }

    /// Builder-style variant of [`push`](Self::push).
    pub fn with(mut self, key: impl Into<String>, value: ExtractedValue) -> Self {
        self.push(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ExtractedValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a ExtractedValue> + 'a {
        self.entries
            .iter()
            .filter(move |(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Returns the nested tree under `key`, if that entry is a tree.
    pub fn get_tree(&self, key: &str) -> Option<&ExtractedTree> {
        self.get(key).and_then(ExtractedValue::as_tree)
    }

    pub fn first(&self) -> Option<(&str, &ExtractedValue)> {
        self.entries
            .first()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtractedValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Iterates the values only, ignoring tag names.
    pub fn values(&self) -> impl Iterator<Item = &ExtractedValue> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Depth-first search for the first text scalar matching `predicate`.
    pub fn find_text(&self, predicate: &dyn Fn(&str) -> bool) -> Option<&str> {
        self.entries.iter().find_map(|(_, value)| match value {
            ExtractedValue::Text(text) if predicate(text) => Some(text.as_str()),
            ExtractedValue::Tree(tree) => tree.find_text(predicate),
            _ => None,
        })
    }

    /// Converts to JSON. Keys seen more than once become arrays.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.entries {
            let json = value.to_json();
            if !self.is_repeated(name) {
                map.insert(name.clone(), json);
                continue;
            }
            if let Value::Array(items) = map
                .entry(name.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                items.push(json);
            }
        }
        Value::Object(map)
    }

    /// Builds a tree from JSON. Array elements become repeated `item` entries.
    pub fn from_json(value: &Value) -> Self {
        let mut tree = Self::new();
        match value {
            Value::Object(map) => {
                for (key, value) in map {
                    tree.push(key.clone(), ExtractedValue::from_json(value));
                }
            }
            Value::Array(items) => {
                for item in items {
                    tree.push(super::ITEM_TAG, ExtractedValue::from_json(item));
                }
            }
            scalar => tree.push("value", ExtractedValue::from_json(scalar)),
        }
        tree
    }

    /// Re-encodes the tree as tagged text.
    pub fn to_markup(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| {
                let tag = super::sanitize_tag(name);
                match value {
                    ExtractedValue::Tree(tree) if tree.is_empty() => format!("<{tag}></{tag}>"),
                    ExtractedValue::Tree(tree) => format!("<{tag}>\n{}\n</{tag}>", tree.to_markup()),
                    scalar => format!("<{tag}>{}</{tag}>", scalar.to_text()),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn is_repeated(&self, key: &str) -> bool {
        self.entries.iter().filter(|(name, _)| name == key).count() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(value: &str) -> ExtractedValue {
        ExtractedValue::Text(value.to_string())
    }

    #[test]
    fn test_get_returns_first_occurrence() {
        let tree = ExtractedTree::new().with("a", text("one")).with("a", text("two"));
        assert_eq!(tree.get("a"), Some(&text("one")));
        assert_eq!(tree.get_all("a").count(), 2);
    }

    #[test]
    fn test_to_json_groups_repeated_keys() {
        let names = ExtractedTree::new()
            .with("item", text("alpha"))
            .with("item", text("beta"))
            .with("item", text("gamma"));
        let tree = ExtractedTree::new()
            .with("names", ExtractedValue::Tree(names))
            .with("single", ExtractedValue::Bool(true));

        assert_eq!(
            tree.to_json(),
            json!({ "names": { "item": ["alpha", "beta", "gamma"] }, "single": true })
        );
    }

    #[test]
    fn test_find_text_is_depth_first() {
        let inner = ExtractedTree::new().with("deep", text("a long nested sentence"));
        let tree = ExtractedTree::new()
            .with("short", text("tiny"))
            .with("nested", ExtractedValue::Tree(inner))
            .with("later", text("another long sentence here"));

        let found = tree.find_text(&|s| s.len() > 10);
        assert_eq!(found, Some("a long nested sentence"));
    }

    #[test]
    fn test_from_json_roundtrips_objects() {
        let value = json!({ "message": "hi", "meta": { "count": 2, "ok": false } });
        let tree = ExtractedTree::from_json(&value);
        assert_eq!(tree.get_tree("meta").unwrap().len(), 2);
        assert_eq!(tree.to_json(), value);
    }

    #[test]
    fn test_to_markup() {
        let tree = ExtractedTree::new()
            .with("answer", ExtractedValue::Number(42.into()))
            .with("meta", ExtractedValue::Tree(ExtractedTree::new().with("ok", ExtractedValue::Bool(true))));
        assert_eq!(tree.to_markup(), "<answer>42</answer>\n<meta>\n<ok>true</ok>\n</meta>");
    }
}
