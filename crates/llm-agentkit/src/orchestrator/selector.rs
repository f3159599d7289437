//! Completion-driven selection of servers and tools.

use crate::completion::{CompletionRequest, CompletionService, SamplingParams};
use crate::markup::{ExtractedValue, RESPONSE_KEY, decode};
use crate::prompt::selection_prompt;
use crate::tools::Selectable;
use crate::trace::TraceScope;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Sampling temperature for selection and parameter requests.
pub const SELECTION_TEMPERATURE: f32 = 0.3;

const NAMES_KEY: &str = "names";
const CANDIDATES_TAG: &str = "available_candidates";

/// What is being selected. Decides the prompt wording and the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    /// Falls back to every candidate.
    Servers,
    /// Falls back to the first candidate only.
    Tools,
}

impl SelectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionKind::Servers => "servers",
            SelectionKind::Tools => "tools",
        }
    }

    /// The selection used when the reply cannot be read.
    pub fn fallback<'c, T>(&self, candidates: &'c [T]) -> Vec<&'c T> {
        match self {
            SelectionKind::Servers => candidates.iter().collect(),
            SelectionKind::Tools => candidates.iter().take(1).collect(),
        }
    }
}

/// Asks the completion service which candidates are relevant to an input.
pub struct ToolSelector<'a> {
    completion: &'a dyn CompletionService,
    model: &'a str,
    system_prompt: Option<&'a str>,
    max_output_tokens: u32,
}

impl<'a> ToolSelector<'a> {
    pub fn new(completion: &'a dyn CompletionService, model: &'a str) -> Self {
        Self {
            completion,
            model,
            system_prompt: None,
            max_output_tokens: 1024,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<&'a str>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Returns the selected candidates in their original order.
    ///
    /// Never fails: a failed request or an unreadable reply yields
    /// [`SelectionKind::fallback`].
    pub async fn select<'c, T: Selectable + Sync>(
        &self,
        kind: SelectionKind,
        input: &Value,
        candidates: &'c [T],
        scope: &TraceScope,
    ) -> Vec<&'c T> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let tree = selection_tree(kind, input, candidates);
        let prompt = match selection_prompt(&tree, kind.as_str(), CANDIDATES_TAG) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(kind = kind.as_str(), error = %err, "Failed to render selection prompt, using fallback");
                return kind.fallback(candidates);
            }
        };

        let request = CompletionRequest::new(self.model)
            .with_system(self.system_prompt.unwrap_or_default())
            .with_user(prompt)
            .with_sampling(SamplingParams::new(SELECTION_TEMPERATURE, self.max_output_tokens));

        let op = format!("select_{}", kind.as_str());
        let reply = match scope.measure(&op, |_| self.completion.complete(request)).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(kind = kind.as_str(), error = %err, "Selection request failed, using fallback");
                return kind.fallback(candidates);
            }
        };

        match parse_names(&reply) {
            Some(names) => {
                let selected: Vec<&T> = candidates
                    .iter()
                    .filter(|candidate| names.iter().any(|name| name == candidate.name()))
                    .collect();
                debug!(
                    kind = kind.as_str(),
                    requested = ?names,
                    selected = selected.len(),
                    "Selection resolved"
                );
                selected
            }
            None => {
                warn!(kind = kind.as_str(), "Selection reply had no names list, using fallback");
                kind.fallback(candidates)
            }
        }
    }
}

fn selection_tree<T: Selectable>(kind: SelectionKind, input: &Value, candidates: &[T]) -> Value {
    let listed: Vec<Value> = candidates
        .iter()
        .map(|candidate| json!({ "name": candidate.name(), "description": candidate.description() }))
        .collect();

    let mut tree = serde_json::Map::new();
    tree.insert("input".to_string(), input.clone());
    tree.insert(CANDIDATES_TAG.to_string(), Value::Array(listed));
    tree.insert(
        "task".to_string(),
        Value::String(format!("Choose the {} relevant to the input.", kind.as_str())),
    );
    tree.insert(
        "response_format".to_string(),
        json!({ RESPONSE_KEY: { NAMES_KEY: ["name_1", "name_2"] } }),
    );
    Value::Object(tree)
}

/// Reads the `names` list, under `response` or at the top level.
pub(crate) fn parse_names(reply: &str) -> Option<Vec<String>> {
    let tree = decode(reply);
    let node = tree
        .get_tree(RESPONSE_KEY)
        .and_then(|response| response.get(NAMES_KEY))
        .or_else(|| tree.get(NAMES_KEY))?;

    let names: Vec<String> = match node {
        ExtractedValue::Tree(items) => items
            .values()
            .map(|value| value.to_text().trim().to_string())
            .collect(),
        ExtractedValue::Text(text) => text
            .split([',', '\n'])
            .map(|name| name.trim().to_string())
            .collect(),
        scalar => vec![scalar.to_text()],
    };
    Some(names.into_iter().filter(|name| !name.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_from_wrapped_items() {
        let reply = "<response>\n<names>\n<item>weather</item>\n<item>maps</item>\n</names>\n</response>";
        assert_eq!(parse_names(reply), Some(vec!["weather".to_string(), "maps".to_string()]));
    }

    #[test]
    fn test_parse_names_top_level_and_comma_list() {
        assert_eq!(
            parse_names("<names>a, b</names>"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_parse_names_empty_list_is_a_valid_answer() {
        assert_eq!(parse_names("<response><names></names></response>"), Some(vec![]));
    }

    #[test]
    fn test_parse_names_missing_list() {
        assert_eq!(parse_names("I would pick the weather server."), None);
        assert_eq!(parse_names("<answer>weather</answer>"), None);
    }

    #[test]
    fn test_fallback_asymmetry() {
        let candidates = ["a", "b", "c"];
        assert_eq!(SelectionKind::Servers.fallback(&candidates), vec![&"a", &"b", &"c"]);
        assert_eq!(SelectionKind::Tools.fallback(&candidates), vec![&"a"]);
        assert!(SelectionKind::Tools.fallback::<&str>(&[]).is_empty());
    }

    struct Recording {
        reply: &'static str,
        requests: std::sync::Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait::async_trait]
    impl CompletionService for Recording {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<String, crate::completion::CompletionError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.to_string())
        }
    }

    #[tokio::test]
    async fn test_select_uses_fixed_temperature_and_candidate_tag() {
        use crate::tools::ToolDescriptor;

        let completion = Recording {
            reply: "<response><names><item>b</item><item>a</item></names></response>",
            requests: std::sync::Mutex::new(Vec::new()),
        };
        let tools = vec![
            ToolDescriptor::new("a", "first", json!({})),
            ToolDescriptor::new("b", "second", json!({})),
            ToolDescriptor::new("c", "third", json!({})),
        ];
        let selected = ToolSelector::new(&completion, "m")
            .select(SelectionKind::Tools, &json!({ "q": "x" }), &tools, &TraceScope::root("test"))
            .await;

        let names: Vec<&str> = selected.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let requests = completion.requests.lock().unwrap();
        assert_eq!(requests[0].sampling.temperature, SELECTION_TEMPERATURE);
        assert!(requests[0].user_prompt().contains("<available_candidates>"));
    }

    #[test]
    fn test_selection_tree_lists_candidates() {
        use crate::tools::ToolDescriptor;

        let tools = vec![ToolDescriptor::new("lookup", "Find words", json!({}))];
        let tree = selection_tree(SelectionKind::Tools, &json!({ "q": "x" }), &tools);

        assert_eq!(tree["available_candidates"][0]["name"], "lookup");
        assert_eq!(tree["response_format"]["response"]["names"][0], "name_1");
    }
}
