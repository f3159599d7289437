//! Progress notifications emitted while a run moves through the pipeline.

use crate::markup::sanitize_tag;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// One progress notification.
///
/// Serializes with a `stage` tag, e.g.
/// `{"stage":"tool_invocation","message":"Calling search.lookup"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProgressEvent {
    ServerSelection {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    ToolDiscovery {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    ToolInvocation {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    ResponseGeneration {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Accumulated text of one output field while the reply is produced.
    Streaming { field: String, value: String },
}

impl ProgressEvent {
    pub fn server_selection(message: impl Into<String>) -> Self {
        Self::ServerSelection {
            message: message.into(),
            data: None,
        }
    }

    pub fn tool_discovery(message: impl Into<String>) -> Self {
        Self::ToolDiscovery {
            message: message.into(),
            data: None,
        }
    }

    pub fn tool_invocation(message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            message: message.into(),
            data: None,
        }
    }

    pub fn response_generation(message: impl Into<String>) -> Self {
        Self::ResponseGeneration {
            message: message.into(),
            data: None,
        }
    }

    pub fn streaming(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Streaming {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Attaches structured data. Has no effect on streaming events.
    pub fn with_data(mut self, value: Value) -> Self {
        match &mut self {
            Self::ServerSelection { data, .. }
            | Self::ToolDiscovery { data, .. }
            | Self::ToolInvocation { data, .. }
            | Self::ResponseGeneration { data, .. } => *data = Some(value),
            Self::Streaming { .. } => {}
        }
        self
    }

    /// The serialized stage name.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ServerSelection { .. } => "server_selection",
            Self::ToolDiscovery { .. } => "tool_discovery",
            Self::ToolInvocation { .. } => "tool_invocation",
            Self::ResponseGeneration { .. } => "response_generation",
            Self::Streaming { .. } => "streaming",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::ServerSelection { message, .. }
            | Self::ToolDiscovery { message, .. }
            | Self::ToolInvocation { message, .. }
            | Self::ResponseGeneration { message, .. } => Some(message),
            Self::Streaming { .. } => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::ServerSelection { data, .. }
            | Self::ToolDiscovery { data, .. }
            | Self::ToolInvocation { data, .. }
            | Self::ResponseGeneration { data, .. } => data.as_ref(),
            Self::Streaming { .. } => None,
        }
    }
}

/// Receives progress events synchronously, in pipeline order.
///
/// Implementations should return quickly; the pipeline waits for each call.
/// Any `Fn(ProgressEvent) + Send + Sync` closure is a sink.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

#[derive(Debug, Default)]
struct FieldProgress {
    name: String,
    tag: String,
    last: Option<String>,
    finished: bool,
}

#[derive(Debug, Default)]
struct StreamState {
    buffer: String,
    fields: Vec<FieldProgress>,
}

/// Turns reply deltas into [`ProgressEvent::Streaming`] events for a set of
/// top-level fields.
///
/// A field streams while its tag is open and its content holds no nested
/// tags. Each event carries the trimmed content seen so far, so values for
/// one field only grow. Fields are named as declared; the reply is matched
/// on their sanitized tags.
pub struct FieldStreamer<'a> {
    sink: &'a dyn ProgressSink,
    state: Mutex<StreamState>,
}

impl<'a> FieldStreamer<'a> {
    pub fn new<I, S>(sink: &'a dyn ProgressSink, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|name| {
                let name = name.into();
                FieldProgress {
                    tag: sanitize_tag(&name),
                    name,
                    ..FieldProgress::default()
                }
            })
            .collect();
        Self {
            sink,
            state: Mutex::new(StreamState {
                buffer: String::new(),
                fields,
            }),
        }
    }

    /// Feeds the next chunk of reply text.
    pub fn push(&self, delta: &str) {
        let events = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.buffer.push_str(delta);
            let StreamState { buffer, fields } = &mut *state;
            fields
                .iter_mut()
                .filter_map(|field| advance(buffer, field))
                .collect::<Vec<_>>()
        };
        for event in events {
            self.sink.emit(event);
        }
    }

    /// Emits the committed value of each streamed field when it differs from
    /// the last streamed value.
    pub fn finish(&self, output: &Value) {
        let events = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state
                .fields
                .iter()
                .filter_map(|field| final_event(field, output))
                .collect::<Vec<_>>()
        };
        for event in events {
            self.sink.emit(event);
        }
    }
}

fn advance(buffer: &str, field: &mut FieldProgress) -> Option<ProgressEvent> {
    if field.finished {
        return None;
    }
    let opening = format!("<{}>", field.tag);
    let closing = format!("</{}>", field.tag);
    let start = buffer.find(&opening)? + opening.len();
    let rest = &buffer[start..];

    let content = match rest.find('<') {
        None => rest,
        Some(at) if rest[at..].starts_with(&closing) => {
            field.finished = true;
            &rest[..at]
        }
        // closing tag still arriving
        Some(at) if closing.starts_with(&rest[at..]) => &rest[..at],
        Some(_) => {
            field.finished = true;
            return None;
        }
    };

    let value = content.trim();
    if value.is_empty() || field.last.as_deref() == Some(value) {
        return None;
    }
    field.last = Some(value.to_string());
    Some(ProgressEvent::streaming(&field.name, value))
}

fn final_event(field: &FieldProgress, output: &Value) -> Option<ProgressEvent> {
    let last = field.last.as_deref()?;
    let committed = output.get(&field.name)?.as_str()?;
    if committed == last {
        return None;
    }
    if committed.chars().count() < last.chars().count() {
        warn!(
            field = %field.name,
            "Committed value is shorter than streamed text, no final streaming event"
        );
        return None;
    }
    Some(ProgressEvent::streaming(&field.name, committed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn collecting_sink() -> (Arc<Mutex<Vec<ProgressEvent>>>, impl Fn(ProgressEvent) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        (events, move |event| sink_events.lock().unwrap().push(event))
    }

    fn streamed(events: &[ProgressEvent], name: &str) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Streaming { field, value } if field == name => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_event_serialization_uses_stage_tag() {
        let event = ProgressEvent::tool_invocation("Calling search.lookup")
            .with_data(json!({ "tool": "lookup" }));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "stage": "tool_invocation", "message": "Calling search.lookup", "data": { "tool": "lookup" } })
        );
        assert_eq!(
            serde_json::to_value(ProgressEvent::streaming("answer", "4")).unwrap(),
            json!({ "stage": "streaming", "field": "answer", "value": "4" })
        );
    }

    #[test]
    fn test_streamer_emits_growing_prefixes() {
        let (events, sink) = collecting_sink();
        let streamer = FieldStreamer::new(&sink, ["answer"]);

        for delta in ["Sure <ans", "wer> The", " capital", " is Paris</an", "swer>"] {
            streamer.push(delta);
        }
        streamer.finish(&json!({ "answer": "The capital is Paris" }));

        let values = streamed(&events.lock().unwrap(), "answer");
        assert_eq!(values, vec!["The", "The capital", "The capital is Paris"]);
        assert!(values.windows(2).all(|pair| pair[0].len() <= pair[1].len()));
    }

    #[test]
    fn test_streamer_final_event_matches_committed_value() {
        let (events, sink) = collecting_sink();
        let streamer = FieldStreamer::new(&sink, ["answer"]);

        streamer.push("<answer>4");
        streamer.finish(&json!({ "answer": "42" }));

        let values = streamed(&events.lock().unwrap(), "answer");
        assert_eq!(values.last().map(String::as_str), Some("42"));
    }

    #[test]
    fn test_streamer_stops_on_nested_tags() {
        let (events, sink) = collecting_sink();
        let streamer = FieldStreamer::new(&sink, ["answer", "note"]);

        streamer.push("<answer><p>x</p></answer><note>fine</note>");

        let events = events.lock().unwrap();
        assert!(streamed(&events, "answer").is_empty());
        assert_eq!(streamed(&events, "note"), vec!["fine"]);
    }

    #[test]
    fn test_streamer_reports_declared_field_names() {
        let (events, sink) = collecting_sink();
        let streamer = FieldStreamer::new(&sink, ["final answer"]);

        streamer.push("<final_answer>Os");
        streamer.push("lo</final_answer>");
        streamer.finish(&json!({ "final answer": "Oslo, Norway" }));

        let events = events.lock().unwrap();
        assert!(streamed(&events, "final_answer").is_empty());
        assert_eq!(streamed(&events, "final answer"), vec!["Os", "Oslo", "Oslo, Norway"]);
    }

    #[test]
    fn test_streamer_skips_shorter_committed_value() {
        let (events, sink) = collecting_sink();
        let streamer = FieldStreamer::new(&sink, ["answer"]);

        streamer.push("<answer>a long partial answer");
        streamer.finish(&json!({ "answer": "short" }));

        let values = streamed(&events.lock().unwrap(), "answer");
        assert_eq!(values, vec!["a long partial answer"]);
    }
}
