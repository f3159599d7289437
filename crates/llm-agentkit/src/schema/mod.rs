//! Schema capability used to declare agent input and output contracts.
//!
//! A [`SchemaDescriptor`] wraps a JSON Schema document (hand-written or derived
//! with `schemars`) and exposes each field's [`FieldKind`] and hint text, resolved
//! once through `$ref`, optional and nullable wrappers. Validation is delegated to
//! the `jsonschema` crate.

pub mod descriptor;
pub mod error;

pub use self::descriptor::{FieldKind, FieldSpec, ObjectShape, SchemaDescriptor};
pub use self::error::SchemaError;
