//! 'llm-agentkit' - declared LLM agents that always return schema-conforming output.
//!
//! An agent is declared by a model, an input schema, an output schema and an
//! optional list of tool servers. Each run walks a fixed pipeline:
//!
//! 1. validate the input against the input schema,
//! 2. select the relevant tool servers and discover their tools,
//! 3. select tools per server, generate parameters and invoke them,
//! 4. ask for the final response in a tagged-text format,
//! 5. recover the output from whatever came back, filling gaps with typed
//!    fallback values so the result passes the output schema.
//!
//! Only invalid input and impossible configurations are errors. Failed
//! selections, unreachable servers, failed tool calls and malformed replies
//! all degrade instead.
//!
//! ```rust,no_run
//! use llm_agentkit::{Agent, HttpCompletionClient};
//! use schemars::JsonSchema;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, JsonSchema)]
//! struct Question {
//!     message: String,
//! }
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct Answer {
//!     answer: String,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let agent = Agent::for_types::<Question, Answer>("gpt-4o")?
//!     .completion_service(HttpCompletionClient::try_from_env()?)
//!     .build()?;
//!
//! let answer: Answer = agent
//!     .run_typed(&Question { message: "Name a prime above 10.".into() })
//!     .await?;
//! println!("{}", answer.answer);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod coerce;
pub mod completion;
pub mod fallback;
pub mod markup;
pub mod observability;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod schema;
pub mod tools;
pub mod trace;

pub use agent::{Agent, AgentBuilder, AgentConfig, AgentError, RunReport};
pub use completion::{CompletionError, CompletionRequest, CompletionService};
#[cfg(feature = "http")]
pub use completion::HttpCompletionClient;
pub use markup::{ExtractedTree, ExtractedValue, decode, encode};
pub use orchestrator::PipelineStage;
pub use progress::{ProgressEvent, ProgressSink};
pub use schema::{FieldKind, SchemaDescriptor, SchemaError};
pub use tools::{ServerDescriptor, ToolDescriptor, ToolError, ToolRegistry};
#[cfg(feature = "http")]
pub use tools::HttpToolRegistry;
pub use trace::{RunContext, TraceScope};
