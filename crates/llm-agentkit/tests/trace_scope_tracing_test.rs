//! Tracing tests for TraceScope and agent runs
//!
//! These tests verify that measured operations emit nested, request-scoped
//! spans and entry/exit lines.

use async_trait::async_trait;
use llm_agentkit::completion::{CompletionError, CompletionRequest, CompletionService};
use llm_agentkit::schema::SchemaDescriptor;
use llm_agentkit::trace::{RunContext, TraceScope};
use llm_agentkit::Agent;
use serde_json::json;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// Captures tracing output to a string for verification
#[derive(Clone)]
struct TestWriter {
    output: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl TestWriter {
    fn new() -> Self {
        Self {
            output: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    fn get_output(&self) -> String {
        let bytes = self.output.lock().unwrap();
        String::from_utf8_lossy(&bytes).to_string()
    }
}

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.output.lock().unwrap().flush()
    }
}

impl<'a> MakeWriter<'a> for TestWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture(level: Level) -> (TestWriter, tracing::subscriber::DefaultGuard) {
    let writer = TestWriter::new();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer.clone())
        .with_max_level(level)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (writer, guard)
}

struct Fixed(&'static str);

#[async_trait]
impl CompletionService for Fixed {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        Ok(self.0.to_string())
    }
}

// ============================================================================
// TraceScope
// ============================================================================

#[tokio::test]
async fn test_nested_measure_logs_entry_and_exit_with_indent() {
    let (writer, _guard) = capture(Level::INFO);

    let root = TraceScope::with_context(RunContext::with_request_id("req-0001"), "run");
    let result = root
        .measure("outer", |scope| async move {
            scope
                .measure("inner", |_| async { Ok::<_, String>(7) })
                .await
        })
        .await;
    assert_eq!(result, Ok(7));

    let output = writer.get_output();
    assert!(output.contains("-> outer"), "output: {output}");
    assert!(output.contains("  -> inner"), "output: {output}");
    assert!(output.contains("  <- inner"), "output: {output}");
    assert!(output.contains("<- outer"), "output: {output}");
    assert!(output.contains("request_id=req-0001"), "output: {output}");
    assert!(output.contains("depth=2"), "output: {output}");

    let inner_exit = output.find("<- inner").unwrap();
    let outer_exit = output.find("<- outer").unwrap();
    assert!(inner_exit < outer_exit);
}

#[tokio::test]
async fn test_failed_measure_logs_warning() {
    let (writer, _guard) = capture(Level::INFO);

    let root = TraceScope::root("run");
    let result = root
        .measure("flaky", |_| async { Err::<(), _>("upstream timed out".to_string()) })
        .await;
    assert!(result.is_err());

    let output = writer.get_output();
    assert!(output.contains("WARN"), "output: {output}");
    assert!(output.contains("<- flaky failed"), "output: {output}");
    assert!(output.contains("upstream timed out"), "output: {output}");
}

#[test]
fn test_measure_sync_logs_within_span() {
    let (writer, _guard) = capture(Level::INFO);

    let root = TraceScope::root("run");
    let value = root.measure_sync("parse", |_| Ok::<_, String>("done"));
    assert_eq!(value, Ok("done"));

    let output = writer.get_output();
    assert!(output.contains("trace_scope{"), "output: {output}");
    assert!(output.contains("op=parse"), "output: {output}");
}

// ============================================================================
// Agent Runs
// ============================================================================

#[tokio::test]
async fn test_agent_run_shares_one_request_id() {
    let (writer, _guard) = capture(Level::INFO);

    let agent = Agent::builder("test-model")
        .input_schema(
            SchemaDescriptor::from_value(json!({
                "type": "object",
                "properties": { "message": { "type": "string" } }
            }))
            .unwrap(),
        )
        .output_schema(
            SchemaDescriptor::from_value(json!({
                "type": "object",
                "properties": { "answer": { "type": "string" } }
            }))
            .unwrap(),
        )
        .completion_service(Fixed("<answer>42</answer>"))
        .build()
        .unwrap();

    let report = agent
        .run_detailed(&json!({ "message": "hi" }), None)
        .await
        .unwrap();

    let output = writer.get_output();
    assert!(output.contains("-> agent.run"), "output: {output}");
    assert!(output.contains("  -> generate_response"), "output: {output}");
    assert!(output.contains("<- agent.run"), "output: {output}");

    let tagged = format!("request_id={}", report.request_id);
    let scoped_lines: Vec<&str> = output
        .lines()
        .filter(|line| line.contains("trace_scope{"))
        .collect();
    assert!(!scoped_lines.is_empty());
    assert!(scoped_lines.iter().all(|line| line.contains(&tagged)), "output: {output}");
}
