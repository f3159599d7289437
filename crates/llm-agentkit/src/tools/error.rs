use thiserror::Error;

/// Errors raised by a tool registry.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool discovery failed for server '{server}': {message}")]
    Discovery { server: String, message: String },

    #[error("Tool '{tool}' on server '{server}' failed: {message}")]
    Invocation {
        server: String,
        tool: String,
        message: String,
    },

    #[error("Invalid tool endpoint for server '{server}': {message}")]
    Endpoint { server: String, message: String },

    #[error("Tool registry error: {0}")]
    Other(String),
}

impl ToolError {
    pub fn discovery(server: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Discovery {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn invocation(
        server: impl Into<String>,
        tool: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ToolError::Invocation {
            server: server.into(),
            tool: tool.into(),
            message: message.into(),
        }
    }
}
