//! Prompt rendering.
//!
//! Every prompt the pipeline sends is a markup-encoded context block followed
//! by a short instruction rendered from a `minijinja` template.

use crate::markup::{encode, sanitize_tag};
use crate::schema::ObjectShape;
use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;

const SELECTION_TEMPLATE: &str = "\
{{ context }}

Select the {{ kind }} from <{{ candidates_tag }}> that are needed to handle <input>.
Reply only with the tags shown in <response_format>, one <item> per selected name.
Use the names exactly as listed. If none are needed, reply with an empty <names></names>.";

const PARAMETERS_TEMPLATE: &str = "\
{{ context }}

Generate the parameters for calling the tool `{{ tool }}` so that it helps with <input>.
Reply only with <response><parameters>...</parameters></response>, \
using one tag per parameter defined in <input_schema>.";

const GENERATION_TEMPLATE: &str = "\
{{ context }}

Produce the final answer for <input>{% if has_tool_results %}, using <tool_results> where relevant{% endif %}.
Reply with exactly one tag per field below and nothing else. Do not wrap them in another tag.
{% for field in fields %}<{{ field.tag }}>{{ field.summary }}</{{ field.tag }}>
{% endfor %}";

/// Renders a template string against a serializable context.
///
/// ```rust
/// use llm_agentkit::prompt::render_prompt;
/// use minijinja::context;
///
/// let text = render_prompt("Hello {{ name }}!", context! { name => "Ada" }).unwrap();
/// assert_eq!(text, "Hello Ada!");
/// ```
pub fn render_prompt<T: Serialize>(template: &str, context: T) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template("prompt", template)?;
    let tmpl = env.get_template("prompt")?;
    tmpl.render(context)
}

/// Builds a selection prompt. `tree` is encoded as the context block and must
/// carry the candidates under `candidates_tag`.
pub(crate) fn selection_prompt(
    tree: &Value,
    kind: &str,
    candidates_tag: &str,
) -> Result<String, minijinja::Error> {
    render_prompt(
        SELECTION_TEMPLATE,
        context! {
            context => encode(tree),
            kind => kind,
            candidates_tag => candidates_tag,
        },
    )
}

pub(crate) fn parameters_prompt(tree: &Value, tool: &str) -> Result<String, minijinja::Error> {
    render_prompt(
        PARAMETERS_TEMPLATE,
        context! {
            context => encode(tree),
            tool => tool,
        },
    )
}

#[derive(Serialize)]
struct FieldLine {
    tag: String,
    summary: String,
}

pub(crate) fn generation_prompt(
    tree: &Value,
    shape: &ObjectShape,
    has_tool_results: bool,
) -> Result<String, minijinja::Error> {
    let fields: Vec<FieldLine> = shape
        .fields()
        .iter()
        .map(|field| FieldLine {
            tag: sanitize_tag(&field.name),
            summary: field.summary(),
        })
        .collect();

    render_prompt(
        GENERATION_TEMPLATE,
        context! {
            context => encode(tree),
            fields => fields,
            has_tool_results => has_tool_results,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};
    use serde_json::json;

    #[test]
    fn test_render_prompt_reports_syntax_errors() {
        assert!(render_prompt("{% if %}", context! {}).is_err());
    }

    #[test]
    fn test_selection_prompt_embeds_encoded_context() {
        let tree = json!({
            "input": { "message": "weather in Oslo" },
            "available_candidates": [{ "name": "weather", "description": "Forecasts" }]
        });
        let prompt = selection_prompt(&tree, "servers", "available_candidates").unwrap();

        assert!(prompt.starts_with("<input>\n<message>weather in Oslo</message>\n</input>"));
        assert!(prompt.contains("<name>weather</name>"));
        assert!(prompt.contains("Select the servers from <available_candidates>"));
    }

    #[test]
    fn test_parameters_prompt_names_the_tool() {
        let prompt = parameters_prompt(&json!({ "tool": { "name": "lookup" } }), "lookup").unwrap();
        assert!(prompt.contains("calling the tool `lookup`"));
        assert!(prompt.contains("<response><parameters>"));
    }

    #[test]
    fn test_generation_prompt_lists_fields() {
        let shape = ObjectShape::new(vec![
            FieldSpec::new("answer", FieldKind::String).with_description("short answer"),
            FieldSpec::new("confidence score", FieldKind::Number),
        ]);
        let prompt = generation_prompt(&json!({ "input": { "q": "?" } }), &shape, false).unwrap();

        assert!(prompt.contains("<answer>string: short answer</answer>"));
        assert!(prompt.contains("<confidence_score>number</confidence_score>"));
        assert!(!prompt.contains("tool_results"));
    }
}
