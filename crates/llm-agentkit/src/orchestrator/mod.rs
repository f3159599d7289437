//! The staged run pipeline.
//!
//! A run moves strictly forward through [`PipelineStage`]s:
//!
//! ```text
//! Validating -> SelectingServers -> DiscoveringTools -> InvokingTools
//!            -> GeneratingResponse -> ValidatingOutput -> Done
//! ```
//!
//! Only two things end a run early: input that fails the input schema, and an
//! output schema that even the wholesale fallback cannot satisfy. Every
//! completion and tool call in between degrades locally and is logged.

pub mod assembly;
pub mod parameters;
pub mod selector;

pub use assembly::{Assembled, assemble};
pub use parameters::ParameterGenerator;
pub use selector::{SELECTION_TEMPERATURE, SelectionKind, ToolSelector};

use crate::agent::{AgentConfig, AgentError};
use crate::completion::{CompletionError, CompletionRequest, CompletionService, SamplingParams};
use crate::fallback::FallbackSynthesizer;
use crate::markup::{ExtractedTree, decode};
use crate::progress::{FieldStreamer, ProgressEvent, ProgressSink};
use crate::prompt::generation_prompt;
use crate::schema::{FieldKind, SchemaDescriptor};
use crate::tools::{ServerDescriptor, ToolDescriptor, ToolError, ToolRegistry};
use crate::trace::TraceScope;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The states of one run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Validating,
    SelectingServers,
    DiscoveringTools,
    InvokingTools,
    GeneratingResponse,
    ValidatingOutput,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Validating => "validating",
            PipelineStage::SelectingServers => "selecting_servers",
            PipelineStage::DiscoveringTools => "discovering_tools",
            PipelineStage::InvokingTools => "invoking_tools",
            PipelineStage::GeneratingResponse => "generating_response",
            PipelineStage::ValidatingOutput => "validating_output",
            PipelineStage::Done => "done",
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Validating => Some(PipelineStage::SelectingServers),
            PipelineStage::SelectingServers => Some(PipelineStage::DiscoveringTools),
            PipelineStage::DiscoveringTools => Some(PipelineStage::InvokingTools),
            PipelineStage::InvokingTools => Some(PipelineStage::GeneratingResponse),
            PipelineStage::GeneratingResponse => Some(PipelineStage::ValidatingOutput),
            PipelineStage::ValidatingOutput => Some(PipelineStage::Done),
            PipelineStage::Done => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub request_id: String,
    /// The validated output object.
    pub output: Value,
    /// Successful tool results keyed `server.tool`.
    pub tool_results: Map<String, Value>,
    /// Whether the output is the wholesale fallback rather than assembled
    /// from the reply.
    pub used_fallback: bool,
}

#[derive(Debug, Error)]
enum ToolCallError {
    #[error("parameter generation failed: {0}")]
    Parameters(#[from] CompletionError),
    #[error(transparent)]
    Invocation(#[from] ToolError),
}

/// One run of an agent's pipeline.
pub struct Orchestrator<'a> {
    config: &'a AgentConfig,
    input_schema: &'a SchemaDescriptor,
    output_schema: &'a SchemaDescriptor,
    servers: &'a [ServerDescriptor],
    completion: &'a dyn CompletionService,
    tools: Option<&'a dyn ToolRegistry>,
    stage: PipelineStage,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a AgentConfig,
        input_schema: &'a SchemaDescriptor,
        output_schema: &'a SchemaDescriptor,
        completion: &'a dyn CompletionService,
    ) -> Self {
        Self {
            config,
            input_schema,
            output_schema,
            servers: &[],
            completion,
            tools: None,
            stage: PipelineStage::Validating,
        }
    }

    pub fn with_servers(
        mut self,
        servers: &'a [ServerDescriptor],
        tools: Option<&'a dyn ToolRegistry>,
    ) -> Self {
        self.servers = servers;
        self.tools = tools;
        self
    }

    /// Runs the pipeline to completion.
    pub async fn run(
        mut self,
        input: &Value,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<RunReport, AgentError> {
        let root = TraceScope::root("agent");
        info!(request_id = %root.request_id(), model = %self.config.model, "Starting agent run");
        root.measure("agent.run", |scope| self.execute(input, sink, scope))
            .await
    }

    async fn execute(
        &mut self,
        input: &Value,
        sink: Option<&dyn ProgressSink>,
        scope: TraceScope,
    ) -> Result<RunReport, AgentError> {
        self.enter(PipelineStage::Validating);
        self.input_schema
            .validate(input)
            .map_err(AgentError::InvalidInput)?;

        let mut tool_results = Map::new();
        if self.servers.is_empty() {
            debug!("No servers configured, skipping tool stages");
        } else {
            let discovered = self.select_and_discover(input, sink, &scope).await;
            if !discovered.is_empty() {
                self.enter(PipelineStage::InvokingTools);
                tool_results = self.invoke_tools(input, &discovered, sink, &scope).await;
            }
        }

        self.enter(PipelineStage::GeneratingResponse);
        emit(sink, ProgressEvent::response_generation("Generating response"));
        let (reply, streamer) = self.generate(input, &tool_results, sink, &scope).await;
        let tree = decode(&reply);
        let assembled = assemble(&tree, &reply, self.output_schema.shape());
        if !assembled.synthesized.is_empty() {
            debug!(fields = ?assembled.synthesized, "Synthesized fields missing from the reply");
        }

        self.enter(PipelineStage::ValidatingOutput);
        let (output, used_fallback) = self.validate_output(input, Value::Object(assembled.output))?;
        if let Some(streamer) = &streamer {
            streamer.finish(&output);
        }

        self.enter(PipelineStage::Done);
        Ok(RunReport {
            request_id: scope.request_id().to_string(),
            output,
            tool_results,
            used_fallback,
        })
    }

    /// Moves forward to `stage`, passing through any skipped stages.
    fn enter(&mut self, stage: PipelineStage) {
        debug_assert!(
            stage >= self.stage,
            "pipeline moved backwards from {} to {stage}",
            self.stage
        );
        while self.stage < stage {
            let Some(next) = self.stage.next() else {
                break;
            };
            if next < stage {
                debug!(stage = %next, "Skipping pipeline stage");
            }
            self.stage = next;
        }
        debug!(stage = %self.stage, "Pipeline stage");
    }

    async fn select_and_discover(
        &mut self,
        input: &Value,
        sink: Option<&dyn ProgressSink>,
        scope: &TraceScope,
    ) -> Vec<(&'a ServerDescriptor, Vec<ToolDescriptor>)> {
        self.enter(PipelineStage::SelectingServers);
        emit(
            sink,
            ProgressEvent::server_selection(format!("Selecting from {} servers", self.servers.len())),
        );
        let selected = self
            .selector()
            .select(SelectionKind::Servers, input, self.servers, scope)
            .await;
        let names: Vec<&str> = selected.iter().map(|server| server.name.as_str()).collect();
        emit(
            sink,
            ProgressEvent::server_selection(format!("Selected {} servers", selected.len()))
                .with_data(json!({ "servers": names })),
        );

        let Some(registry) = self.tools else {
            warn!("Servers configured without a tool registry, skipping tool stages");
            return Vec::new();
        };
        if selected.is_empty() {
            return Vec::new();
        }

        self.enter(PipelineStage::DiscoveringTools);
        emit(
            sink,
            ProgressEvent::tool_discovery(format!("Discovering tools on {} servers", selected.len())),
        );
        let mut discovered = Vec::new();
        for server in selected {
            let op = format!("discover.{}", server.name);
            match scope.measure(&op, |_| registry.discover(server)).await {
                Ok(tools) if !tools.is_empty() => discovered.push((server, tools)),
                Ok(_) => debug!(server = %server.name, "Server reported no tools"),
                Err(err) => warn!(server = %server.name, error = %err, "Tool discovery failed, skipping server"),
            }
        }
        discovered
    }

    async fn invoke_tools(
        &self,
        input: &Value,
        discovered: &[(&'a ServerDescriptor, Vec<ToolDescriptor>)],
        sink: Option<&dyn ProgressSink>,
        scope: &TraceScope,
    ) -> Map<String, Value> {
        let mut results = Map::new();
        let Some(registry) = self.tools else {
            return results;
        };
        let selector = self.selector();
        let generator = ParameterGenerator::new(self.completion, &self.config.model)
            .with_system_prompt(self.config.system_prompt.as_deref())
            .with_max_output_tokens(self.config.selection_max_tokens);
        let generator = &generator;

        for (server, tools) in discovered {
            let selected = selector.select(SelectionKind::Tools, input, tools, scope).await;
            for tool in selected {
                let key = format!("{}.{}", server.name, tool.name);
                emit(
                    sink,
                    ProgressEvent::tool_invocation(format!("Invoking {key}"))
                        .with_data(json!({ "server": server.name, "tool": tool.name })),
                );

                let call = scope
                    .measure(&format!("tool.{key}"), |child| async move {
                        let parameters = generator.generate(input, tool, &child).await?;
                        let result = registry.invoke(server, &tool.name, parameters).await?;
                        Ok::<_, ToolCallError>(result)
                    })
                    .await;
                match call {
                    Ok(result) => {
                        results.insert(key, result);
                    }
                    Err(err) => warn!(tool = %key, error = %err, "Tool call failed, excluding result"),
                }
            }
        }
        results
    }

    async fn generate<'s>(
        &self,
        input: &Value,
        tool_results: &Map<String, Value>,
        sink: Option<&'s dyn ProgressSink>,
        scope: &TraceScope,
    ) -> (String, Option<FieldStreamer<'s>>) {
        let shape = self.output_schema.shape();
        let mut context = Map::new();
        context.insert("input".to_string(), input.clone());
        if !tool_results.is_empty() {
            context.insert("tool_results".to_string(), Value::Object(tool_results.clone()));
        }
        context.insert("output_format".to_string(), shape.describe());

        let prompt = match generation_prompt(&Value::Object(context), shape, !tool_results.is_empty()) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %err, "Failed to render generation prompt, using fallbacks");
                return (String::new(), None);
            }
        };

        let request = CompletionRequest::new(&self.config.model)
            .with_system(self.config.system_prompt.clone().unwrap_or_default())
            .with_user(prompt)
            .with_sampling(SamplingParams::new(
                self.config.temperature,
                self.config.max_output_tokens,
            ));

        let streamer = sink.map(|sink| {
            let fields = shape
                .fields()
                .iter()
                .filter(|field| field.kind == FieldKind::String)
                .map(|field| field.name.as_str());
            FieldStreamer::new(sink, fields)
        });

        let completion = self.completion;
        let reply = scope
            .measure("generate_response", |_| async {
                match &streamer {
                    Some(streamer) => {
                        let on_delta = |delta: &str| streamer.push(delta);
                        completion.complete_streaming(request, &on_delta).await
                    }
                    None => completion.complete(request).await,
                }
            })
            .await;

        match reply {
            Ok(reply) => (reply, streamer),
            Err(err) => {
                warn!(error = %err, "Response generation failed, using fallbacks");
                (String::new(), streamer)
            }
        }
    }

    /// Returns the output and whether the wholesale fallback replaced it.
    fn validate_output(&self, input: &Value, output: Value) -> Result<(Value, bool), AgentError> {
        let errors = match self.output_schema.validate(&output) {
            Ok(()) => return Ok((output, false)),
            Err(errors) => errors,
        };
        warn!(?errors, "Assembled output failed validation, using wholesale fallback");

        let input_tree = ExtractedTree::from_json(input);
        let fallback = Value::Object(
            FallbackSynthesizer::new(&input_tree, "").synthesize_object(self.output_schema.shape()),
        );
        self.output_schema
            .validate(&fallback)
            .map_err(AgentError::UnsatisfiableOutput)?;
        Ok((fallback, true))
    }

    fn selector(&self) -> ToolSelector<'a> {
        let config: &'a AgentConfig = self.config;
        ToolSelector::new(self.completion, &config.model)
            .with_system_prompt(config.system_prompt.as_deref())
            .with_max_output_tokens(config.selection_max_tokens)
    }
}

fn emit(sink: Option<&dyn ProgressSink>, event: ProgressEvent) {
    if let Some(sink) = sink {
        sink.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_only_move_forward() {
        let mut stage = PipelineStage::Validating;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            stage = next;
            seen.push(stage);
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(stage, PipelineStage::Done);
    }

    struct Silent;

    #[async_trait::async_trait]
    impl CompletionService for Silent {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_enter_walks_through_skipped_stages() {
        let config = AgentConfig::new("m");
        let schema = SchemaDescriptor::from_value(json!({ "type": "object", "properties": {} })).unwrap();
        let mut orchestrator = Orchestrator::new(&config, &schema, &schema, &Silent);

        orchestrator.enter(PipelineStage::Validating);
        assert_eq!(orchestrator.stage, PipelineStage::Validating);
        orchestrator.enter(PipelineStage::GeneratingResponse);
        assert_eq!(orchestrator.stage, PipelineStage::GeneratingResponse);
        orchestrator.enter(PipelineStage::Done);
        assert_eq!(orchestrator.stage, PipelineStage::Done);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::SelectingServers.to_string(), "selecting_servers");
        assert_eq!(PipelineStage::ValidatingOutput.as_str(), "validating_output");
    }
}
