//! Completion-driven generation of tool call parameters.

use super::selector::SELECTION_TEMPERATURE;
use crate::coerce::coerce_tree;
use crate::completion::{CompletionError, CompletionRequest, CompletionService, SamplingParams};
use crate::markup::{ExtractedValue, RESPONSE_KEY, decode};
use crate::prompt::parameters_prompt;
use crate::schema::ObjectShape;
use crate::tools::ToolDescriptor;
use crate::trace::TraceScope;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

const PARAMETERS_KEY: &str = "parameters";

pub struct ParameterGenerator<'a> {
    completion: &'a dyn CompletionService,
    model: &'a str,
    system_prompt: Option<&'a str>,
    max_output_tokens: u32,
}

impl<'a> ParameterGenerator<'a> {
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

    /// Asks for the parameters of one tool call.
    ///
    /// A reply without a `parameters` object yields `{}`; only a failed
    /// completion request is an error.
    pub async fn generate(
        &self,
        input: &Value,
        tool: &ToolDescriptor,
        scope: &TraceScope,
    ) -> Result<Value, CompletionError> {
        let tree = json!({
            "input": input,
            "tool": {
                "name": tool.name,
                "description": tool.description,
                "input_schema": schema_text(&tool.input_schema),
            },
            "response_format": { RESPONSE_KEY: { PARAMETERS_KEY: { "parameter_name": "value" } } },
        });
        let prompt = parameters_prompt(&tree, &tool.name)
            .map_err(|err| CompletionError::Other(format!("failed to render parameters prompt: {err}")))?;

        let request = CompletionRequest::new(self.model)
            .with_system(self.system_prompt.unwrap_or_default())
            .with_user(prompt)
            .with_sampling(SamplingParams::new(SELECTION_TEMPERATURE, self.max_output_tokens));

        let reply = scope
            .measure("generate_parameters", |_| self.completion.complete(request))
            .await?;
        Ok(parse_parameters(&reply, &tool.input_schema))
    }
}

fn schema_text(schema: &Value) -> String {
    serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
}

/// Reads `parameters` under `response` or at the top level, coercing it
/// against the tool's input schema when that is an object schema.
pub(crate) fn parse_parameters(reply: &str, input_schema: &Value) -> Value {
    let tree = decode(reply);
    let node = tree
        .get_tree(RESPONSE_KEY)
        .and_then(|response| response.get(PARAMETERS_KEY))
        .or_else(|| tree.get(PARAMETERS_KEY));

    let parameters = match node {
        Some(ExtractedValue::Tree(parameters)) => {
            let shape = ObjectShape::from_schema(input_schema).ok();
            coerce_tree(parameters, shape.as_ref())
        }
        Some(ExtractedValue::Text(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            _ => {
                debug!("Parameters tag held no tags and no JSON object");
                Map::new()
            }
        },
        Some(_) | None => {
            warn!("Parameter reply had no parameters object, using empty parameters");
            Map::new()
        }
    };
    Value::Object(parameters)
}
