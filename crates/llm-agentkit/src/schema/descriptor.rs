use super::error::SchemaError;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Limit for `$ref` chains and wrapper unwrapping.
const MAX_REF_HOPS: usize = 32;

/// Recursive schemas (a node type containing itself) are cut off at this depth.
const MAX_NESTING: usize = 16;

/// The closed set of semantic value categories a schema field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    /// Returns the lowercase name used in prompts and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }

    fn from_type_name(name: &str) -> Self {
        match name {
            "number" | "integer" => FieldKind::Number,
            "boolean" => FieldKind::Boolean,
            "array" => FieldKind::Array,
            "object" => FieldKind::Object,
            _ => FieldKind::String,
        }
    }

    fn of_value(value: &Value) -> Self {
        match value {
            Value::Number(_) => FieldKind::Number,
            Value::Bool(_) => FieldKind::Boolean,
            Value::Array(_) => FieldKind::Array,
            Value::Object(_) => FieldKind::Object,
            Value::String(_) | Value::Null => FieldKind::String,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared field, with its kind already resolved through optional and
/// nullable wrappers.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Human-readable hint taken from `description` (or `title`).
    pub description: Option<String>,
    pub required: bool,
    /// Declared fields of an object-kind field.
    pub children: Option<ObjectShape>,
    /// Element spec of an array-kind field.
    pub items: Option<Box<FieldSpec>>,
}

impl FieldSpec {
    /// Creates a field with no hint and no nested structure.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: true,
            children: None,
            items: None,
        }
    }

    /// Adds a hint text.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches nested fields to an object-kind field.
    pub fn with_children(mut self, children: ObjectShape) -> Self {
        self.children = Some(children);
        self
    }

    /// Returns the prompt-facing summary, e.g. `number: age in years`.
    pub fn summary(&self) -> String {
        match &self.description {
            Some(hint) => format!("{}: {}", self.kind, hint),
            None => self.kind.to_string(),
        }
    }
}

/// An ordered list of fields describing one object level of a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    fields: Vec<FieldSpec>,
}

impl ObjectShape {
    /// Builds a shape from already resolved fields.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Reads the top level of an object schema document.
    ///
    /// References are resolved against `document` itself.
    pub fn from_schema(document: &Value) -> Result<Self, SchemaError> {
        let resolver = Resolver { root: document };
        let resolved = resolver.unwrap(document)?;
        if kind_of(resolved) != FieldKind::Object {
            return Err(SchemaError::NotAnObject(format!(
                "top-level kind is {}",
                kind_of(resolved)
            )));
        }
        resolver.shape(resolved, 0)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns the dotted path of the first array-kind field, searching
    /// depth-first in declaration order.
    pub fn find_array_field(&self) -> Option<String> {
        self.find_array_path(None)
    }

    fn find_array_path(&self, parent: Option<&str>) -> Option<String> {
        for field in &self.fields {
            let path = match parent {
                Some(parent) => format!("{parent}.{}", field.name),
                None => field.name.clone(),
            };
            match field.kind {
                FieldKind::Array => return Some(path),
                FieldKind::Object => {
                    if let Some(found) = field
                        .children
                        .as_ref()
                        .and_then(|children| children.find_array_path(Some(&path)))
                    {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Describes the shape as a tree of `field -> "kind: hint"` entries,
    /// suitable for markup encoding into a prompt.
    pub fn describe(&self) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            let entry = match (&field.kind, &field.children) {
                (FieldKind::Object, Some(children)) if !children.is_empty() => children.describe(),
                _ => Value::String(field.summary()),
            };
            map.insert(field.name.clone(), entry);
        }
        Value::Object(map)
    }
}

/// A schema capability: enumerate fields, get each field's kind, validate a
/// candidate value.
#[derive(Clone)]
pub struct SchemaDescriptor {
    document: Value,
    shape: ObjectShape,
    validator: Arc<jsonschema::Validator>,
}

impl SchemaDescriptor {
    /// Wraps a JSON Schema document describing an object.
    pub fn from_value(document: Value) -> Result<Self, SchemaError> {
        let shape = ObjectShape::from_schema(&document)?;
        let validator = jsonschema::Validator::new(&document)
            .map_err(|err| SchemaError::InvalidDocument(err.to_string()))?;
        Ok(Self {
            document,
            shape,
            validator: Arc::new(validator),
        })
    }

    /// Derives the descriptor from a Rust type.
    ///
    /// ```rust
    /// use llm_agentkit::schema::{FieldKind, SchemaDescriptor};
    ///
    /// #[derive(schemars::JsonSchema)]
    /// struct Answer {
    ///     /// The final answer
    ///     answer: String,
    ///     confidence: Option<f64>,
    /// }
    ///
    /// let schema = SchemaDescriptor::of::<Answer>().unwrap();
    /// assert_eq!(schema.fields()[1].kind, FieldKind::Number);
    /// ```
    pub fn of<T: JsonSchema>() -> Result<Self, SchemaError> {
        let root = schemars::schema_for!(T);
        let document =
            serde_json::to_value(&root).map_err(|err| SchemaError::Generation(err.to_string()))?;
        Self::from_value(document)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        self.shape.fields()
    }

    pub fn shape(&self) -> &ObjectShape {
        &self.shape
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Validates a candidate value, returning every violation message.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        if self.validator.is_valid(value) {
            return Ok(());
        }
        Err(self
            .validator
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect())
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validator.is_valid(value)
    }
}

impl fmt::Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

struct Resolver<'a> {
    root: &'a Value,
}

impl<'a> Resolver<'a> {
    fn deref(&self, schema: &'a Value) -> Result<&'a Value, SchemaError> {
        let mut current = schema;
        for _ in 0..MAX_REF_HOPS {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Ok(current);
            };
            let pointer = reference
                .strip_prefix('#')
                .ok_or_else(|| SchemaError::UnresolvedReference(reference.to_string()))?;
            current = self
                .root
                .pointer(pointer)
                .ok_or_else(|| SchemaError::UnresolvedReference(reference.to_string()))?;
        }
        Err(SchemaError::UnresolvedReference(
            "reference chain too long".to_string(),
        ))
    }

    /// Peels `$ref`, single-branch `allOf` and nullable `anyOf`/`oneOf`.
    fn unwrap(&self, schema: &'a Value) -> Result<&'a Value, SchemaError> {
        let mut current = self.deref(schema)?;
        for _ in 0..MAX_REF_HOPS {
            if let Some([single]) = current.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
                current = self.deref(single)?;
                continue;
            }
            let branches = current
                .get("anyOf")
                .or_else(|| current.get("oneOf"))
                .and_then(Value::as_array);
            if let Some(branch) = branches.and_then(|b| b.iter().find(|s| !is_null_schema(s))) {
                if current.get("type").is_none() && current.get("properties").is_none() {
                    current = self.deref(branch)?;
                    continue;
                }
            }
            break;
        }
        Ok(current)
    }

    fn shape(&self, schema: &'a Value, depth: usize) -> Result<ObjectShape, SchemaError> {
        if depth > MAX_NESTING {
            return Ok(ObjectShape::default());
        }
        let required: HashSet<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Ok(ObjectShape::default());
        };

        let fields = properties
            .iter()
            .map(|(name, property)| {
                self.field(name, property, required.contains(name.as_str()), depth)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ObjectShape::new(fields))
    }

    fn field(
        &self,
        name: &str,
        schema: &'a Value,
        required: bool,
        depth: usize,
    ) -> Result<FieldSpec, SchemaError> {
        let resolved = self.unwrap(schema)?;
        let kind = kind_of(resolved);

        let children = match kind {
            FieldKind::Object => Some(self.shape(resolved, depth + 1)?),
            _ => None,
        };
        let items = match kind {
            FieldKind::Array => resolved
                .get("items")
                .and_then(|items| match items {
                    Value::Array(tuple) => tuple.first(),
                    single => Some(single),
                })
                .map(|items| self.field("item", items, true, depth + 1))
                .transpose()?
                .map(Box::new),
            _ => None,
        };

        Ok(FieldSpec {
            name: name.to_string(),
            kind,
            description: hint(schema).or_else(|| hint(resolved)),
            required,
            children,
            items,
        })
    }
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

fn hint(schema: &Value) -> Option<String> {
    schema
        .get("description")
        .or_else(|| schema.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn kind_of(schema: &Value) -> FieldKind {
    match schema.get("type") {
        Some(Value::String(name)) => FieldKind::from_type_name(name),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null")
            .map(FieldKind::from_type_name)
            .unwrap_or(FieldKind::String),
        _ if schema.get("properties").is_some() => FieldKind::Object,
        _ if schema.get("items").is_some() => FieldKind::Array,
        _ => {
            if let Some(constant) = schema.get("const") {
                FieldKind::of_value(constant)
            } else if let Some(Value::Array(values)) = schema.get("enum") {
                values
                    .iter()
                    .find(|value| !value.is_null())
                    .map(FieldKind::of_value)
                    .unwrap_or(FieldKind::String)
            } else {
                FieldKind::String
            }
        }
    }
}
