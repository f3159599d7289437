//! Error types for the schema module.

use thiserror::Error;

/// Errors raised while reading a schema document.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// The document is not an object schema with `properties`.
    #[error("Schema must describe an object with properties: {0}")]
    NotAnObject(String),

    /// A `$ref` pointed outside the document or at nothing.
    #[error("Unresolvable schema reference: {0}")]
    UnresolvedReference(String),

    /// The validator rejected the document itself.
    #[error("Invalid schema document: {0}")]
    InvalidDocument(String),

    /// Generating a schema from a Rust type failed.
    #[error("Failed to generate schema: {0}")]
    Generation(String),
}
