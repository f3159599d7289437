//! Error types for the agent module.

use crate::schema::SchemaError;
use thiserror::Error;

/// Errors returned by agent construction and runs.
///
/// Runs only fail for input that violates the input schema and for output
/// schemas the fallback values cannot satisfy. Everything else degrades.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The input does not match the input schema.
    #[error("Input failed schema validation: {}", .0.join("; "))]
    InvalidInput(Vec<String>),

    /// The output schema declares an array field, which replies cannot be
    /// decoded into.
    #[error("Output schema field '{path}' is an array; array output fields are not supported")]
    ArrayOutputField { path: String },

    /// Neither the assembled output nor the wholesale fallback passed the
    /// output schema.
    #[error("Output schema cannot be satisfied by fallback values: {}", .0.join("; "))]
    UnsatisfiableOutput(Vec<String>),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The agent was built with missing or conflicting settings.
    #[error("Agent configuration error: {0}")]
    Configuration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the error comes from how the agent was configured rather than
    /// from a particular input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AgentError::ArrayOutputField { .. }
                | AgentError::UnsatisfiableOutput(_)
                | AgentError::Schema(_)
                | AgentError::Configuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_field_message_names_path() {
        let err = AgentError::ArrayOutputField {
            path: "data.items".to_string(),
        };
        assert!(err.to_string().contains("'data.items'"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_input_joins_messages() {
        let err = AgentError::InvalidInput(vec!["a is required".into(), "b is not a number".into()]);
        assert_eq!(
            err.to_string(),
            "Input failed schema validation: a is required; b is not a number"
        );
        assert!(!err.is_configuration());
    }
}
