use serde::{Deserialize, Serialize};

/// Model and sampling settings for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    /// Temperature for the final response.
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Output token limit for server/tool selection and parameter generation.
    pub selection_max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: None,
            temperature: 0.7,
            max_output_tokens: 4096,
            selection_max_tokens: 1024,
        }
    }
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_selection_max_tokens(mut self, selection_max_tokens: u32) -> Self {
        self.selection_max_tokens = selection_max_tokens;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::new("gpt-4o");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_output_tokens, 4096);
        assert_eq!(config.selection_max_tokens, 1024);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{ "model": "claude-sonnet-4-20250514", "temperature": 0.2 }"#).unwrap();
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.selection_max_tokens, 1024);
    }
}
