//! The tool registry boundary: tool servers, the tools they expose, and the
//! two calls the pipeline makes against them.

pub mod error;
#[cfg(feature = "http")]
pub mod http;

pub use self::error::ToolError;
#[cfg(feature = "http")]
pub use self::http::HttpToolRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

/// A configured tool server.
///
/// Server lists are plain data, so a host application can load them from
/// its own config file:
///
/// ```rust
/// use llm_agentkit::tools::ServerDescriptor;
///
/// let servers: Vec<ServerDescriptor> = serde_json::from_str(r#"[
///     { "name": "search", "description": "Web search", "url": "http://localhost:9000/" }
/// ]"#).unwrap();
/// assert_eq!(servers[0].url.as_str(), "http://localhost:9000/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: Url,
}

impl ServerDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url,
        }
    }
}

/// A tool as reported by a server's discovery endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema", alias = "input_schema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

fn empty_object_schema() -> Value {
    json!({ "type": "object" })
}

/// Candidates the selector can choose from.
pub trait Selectable {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
}

impl Selectable for ServerDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl Selectable for ToolDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Discovers and invokes tools on a server.
///
/// Both calls may fail or time out; the pipeline treats a failure as an empty
/// or absent result.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn discover(&self, server: &ServerDescriptor) -> Result<Vec<ToolDescriptor>, ToolError>;

    async fn invoke(
        &self,
        server: &ServerDescriptor,
        tool: &str,
        parameters: Value,
    ) -> Result<Value, ToolError>;
}
