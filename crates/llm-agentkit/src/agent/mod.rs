//! The agent contract: a model, an input schema, an output schema and
//! optional tool servers, run as one pipeline per call.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_agentkit::agent::Agent;
//! use llm_agentkit::completion::HttpCompletionClient;
//! use llm_agentkit::schema::SchemaDescriptor;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let agent = Agent::builder("claude-sonnet-4-20250514")
//!     .input_schema(SchemaDescriptor::from_value(json!({
//!         "type": "object",
//!         "properties": { "message": { "type": "string" } },
//!         "required": ["message"]
//!     }))?)
//!     .output_schema(SchemaDescriptor::from_value(json!({
//!         "type": "object",
//!         "properties": { "answer": { "type": "string" } },
//!         "required": ["answer"]
//!     }))?)
//!     .completion_service(HttpCompletionClient::try_from_env()?)
//!     .build()?;
//!
//! let output = agent.run(&json!({ "message": "What is 6 x 7?" })).await?;
//! println!("{}", output["answer"]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;

pub use config::AgentConfig;
pub use error::AgentError;
pub use crate::orchestrator::RunReport;

use crate::completion::CompletionService;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressSink;
use crate::schema::SchemaDescriptor;
use crate::tools::{ServerDescriptor, ToolRegistry};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A configured agent. Cheap to clone; runs share nothing mutable.
#[derive(Clone)]
pub struct Agent {
    config: AgentConfig,
    input_schema: SchemaDescriptor,
    output_schema: SchemaDescriptor,
    servers: Arc<[ServerDescriptor]>,
    completion: Arc<dyn CompletionService>,
    tools: Option<Arc<dyn ToolRegistry>>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("servers", &self.servers)
            .field("has_tool_registry", &self.tools.is_some())
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn builder(model: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(model)
    }

    /// Starts a builder whose schemas are derived from `I` and `O`.
    pub fn for_types<I: JsonSchema, O: JsonSchema>(
        model: impl Into<String>,
    ) -> Result<AgentBuilder, AgentError> {
        Ok(AgentBuilder::new(model)
            .input_schema(SchemaDescriptor::of::<I>()?)
            .output_schema(SchemaDescriptor::of::<O>()?))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn input_schema(&self) -> &SchemaDescriptor {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &SchemaDescriptor {
        &self.output_schema
    }

    pub fn servers(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    /// Runs the pipeline and returns the validated output.
    pub async fn run(&self, input: &Value) -> Result<Value, AgentError> {
        Ok(self.run_detailed(input, None).await?.output)
    }

    /// Like [`run`](Self::run), reporting progress to `sink`.
    pub async fn run_with_progress(
        &self,
        input: &Value,
        sink: &dyn ProgressSink,
    ) -> Result<Value, AgentError> {
        Ok(self.run_detailed(input, Some(sink)).await?.output)
    }

    /// Runs the pipeline and returns everything it produced.
    pub async fn run_detailed(
        &self,
        input: &Value,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<RunReport, AgentError> {
        Orchestrator::new(
            &self.config,
            &self.input_schema,
            &self.output_schema,
            self.completion.as_ref(),
        )
        .with_servers(&self.servers, self.tools.as_deref())
        .run(input, sink)
        .await
    }

    /// Serializes `input`, runs, and deserializes the output into `O`.
    pub async fn run_typed<I, O>(&self, input: &I) -> Result<O, AgentError>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)?;
        let output = self.run(&input).await?;
        Ok(serde_json::from_value(output)?)
    }
}

/// Builder for [`Agent`]. [`build`](Self::build) checks the configuration.
pub struct AgentBuilder {
    config: AgentConfig,
    input_schema: Option<SchemaDescriptor>,
    output_schema: Option<SchemaDescriptor>,
    servers: Vec<ServerDescriptor>,
    completion: Option<Arc<dyn CompletionService>>,
    tools: Option<Arc<dyn ToolRegistry>>,
}

impl AgentBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            config: AgentConfig::new(model),
            input_schema: None,
            output_schema: None,
            servers: Vec::new(),
            completion: None,
            tools: None,
        }
    }

    /// Replaces the whole configuration, model included.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.config.max_output_tokens = max_output_tokens;
        self
    }

    pub fn input_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn output_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn server(mut self, server: ServerDescriptor) -> Self {
        self.servers.push(server);
        self
    }

    pub fn servers(mut self, servers: impl IntoIterator<Item = ServerDescriptor>) -> Self {
        self.servers.extend(servers);
        self
    }

    pub fn completion_service(self, service: impl CompletionService + 'static) -> Self {
        self.shared_completion_service(Arc::new(service))
    }

    pub fn shared_completion_service(mut self, service: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(service);
        self
    }

    pub fn tool_registry(self, registry: impl ToolRegistry + 'static) -> Self {
        self.shared_tool_registry(Arc::new(registry))
    }

    pub fn shared_tool_registry(mut self, registry: Arc<dyn ToolRegistry>) -> Self {
        self.tools = Some(registry);
        self
    }

    /// Validates the configuration and builds the agent.
    ///
    /// Fails when the output schema has an array field at any depth, when a
    /// schema or the completion service is missing, when server names are
    /// empty or repeated, or when servers are configured without a tool
    /// registry.
    pub fn build(self) -> Result<Agent, AgentError> {
        let output_schema = self
            .output_schema
            .ok_or_else(|| AgentError::Configuration("output schema is required".into()))?;
        if let Some(path) = output_schema.shape().find_array_field() {
            return Err(AgentError::ArrayOutputField { path });
        }
        let input_schema = self
            .input_schema
            .ok_or_else(|| AgentError::Configuration("input schema is required".into()))?;
        let completion = self
            .completion
            .ok_or_else(|| AgentError::Configuration("completion service is required".into()))?;
        if self.config.model.trim().is_empty() {
            return Err(AgentError::Configuration("model must not be empty".into()));
        }

        validate_servers(&self.servers)?;
        let tools = match self.tools {
            Some(tools) => Some(tools),
            None if self.servers.is_empty() => None,
            None => Some(default_tool_registry()?),
        };

        Ok(Agent {
            config: self.config,
            input_schema,
            output_schema,
            servers: self.servers.into(),
            completion,
            tools,
        })
    }
}

fn validate_servers(servers: &[ServerDescriptor]) -> Result<(), AgentError> {
    let mut seen = HashSet::new();
    for server in servers {
        if server.name.trim().is_empty() {
            return Err(AgentError::Configuration(format!(
                "server at {} has an empty name",
                server.url
            )));
        }
        if !seen.insert(server.name.as_str()) {
            return Err(AgentError::Configuration(format!(
                "duplicate server name '{}'",
                server.name
            )));
        }
    }
    Ok(())
}

#[cfg(feature = "http")]
fn default_tool_registry() -> Result<Arc<dyn ToolRegistry>, AgentError> {
    Ok(Arc::new(crate::tools::HttpToolRegistry::new()))
}

#[cfg(not(feature = "http"))]
fn default_tool_registry() -> Result<Arc<dyn ToolRegistry>, AgentError> {
    Err(AgentError::Configuration(
        "servers are configured but no tool registry was provided".into(),
    ))
}
