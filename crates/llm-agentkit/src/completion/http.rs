//! HttpCompletionClient - a [`CompletionService`] over the provider REST APIs.
//!
//! The provider is picked from the model id of each request, so one client can
//! serve an agent whose model is `claude-*`, `gemini-*` or anything served by
//! an OpenAI-compatible endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_agentkit::completion::{CompletionRequest, CompletionService, HttpCompletionClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Reads ANTHROPIC_API_KEY, OPENAI_API_KEY, GEMINI_API_KEY and OPENAI_BASE_URL
//! let client = HttpCompletionClient::try_from_env()?;
//! let text = client
//!     .complete(CompletionRequest::new("claude-sonnet-4-20250514").with_user("Hello"))
//!     .await?;
//!
//! // Explicit keys
//! let client = HttpCompletionClient::new()
//!     .with_openai_key("sk-...")
//!     .with_openai_base_url("http://localhost:11434/v1");
//! # Ok(())
//! # }
//! ```

use super::{CompletionError, CompletionRequest, CompletionService, Role};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, header::HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// The API family a model id is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Gemini,
    OpenAi,
}

impl Provider {
    /// `claude` routes to Anthropic, `gemini` to Gemini, anything else to an
    /// OpenAI-compatible endpoint.
    pub fn detect(model: &str) -> Self {
        let model = model.to_ascii_lowercase();
        if model.contains("claude") {
            Provider::Anthropic
        } else if model.contains("gemini") {
            Provider::Gemini
        } else {
            Provider::OpenAi
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::Gemini => "Gemini",
            Provider::OpenAi => "OpenAI",
        }
    }

    fn key_variable(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Completion client that talks to the provider HTTP APIs.
#[derive(Clone)]
pub struct HttpCompletionClient {
    client: Client,
    anthropic_key: Option<String>,
    openai_key: Option<String>,
    gemini_key: Option<String>,
    openai_base_url: String,
}

impl std::fmt::Debug for HttpCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionClient")
            .field("anthropic_key", &self.anthropic_key.as_ref().map(|_| "***"))
            .field("openai_key", &self.openai_key.as_ref().map(|_| "***"))
            .field("gemini_key", &self.gemini_key.as_ref().map(|_| "***"))
            .field("openai_base_url", &self.openai_base_url)
            .finish()
    }
}

impl Default for HttpCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCompletionClient {
    /// Creates a client without credentials.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            anthropic_key: None,
            openai_key: None,
            gemini_key: None,
            openai_base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    /// Loads credentials from environment variables.
    ///
    /// Environment variables:
    /// - `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `GEMINI_API_KEY` (at least one)
    /// - `OPENAI_BASE_URL` (optional, for OpenAI-compatible servers)
    pub fn try_from_env() -> Result<Self, CompletionError> {
        let mut client = Self::new();
        client.anthropic_key = env::var("ANTHROPIC_API_KEY").ok();
        client.openai_key = env::var("OPENAI_API_KEY").ok();
        client.gemini_key = env::var("GEMINI_API_KEY").ok();
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            client = client.with_openai_base_url(base_url);
        }

        if client.anthropic_key.is_none() && client.openai_key.is_none() && client.gemini_key.is_none() {
            return Err(CompletionError::Configuration(
                "none of ANTHROPIC_API_KEY, OPENAI_API_KEY or GEMINI_API_KEY is set".to_string(),
            ));
        }
        Ok(client)
    }

    pub fn with_anthropic_key(mut self, key: impl Into<String>) -> Self {
        self.anthropic_key = Some(key.into());
        self
    }

    pub fn with_openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai_key = Some(key.into());
        self
    }

    pub fn with_gemini_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_key = Some(key.into());
        self
    }

    /// Points OpenAI-routed models at a compatible server.
    pub fn with_openai_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replaces the underlying HTTP client, e.g. to set timeouts or proxies.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn key_for(&self, provider: Provider) -> Result<&str, CompletionError> {
        let key = match provider {
            Provider::Anthropic => &self.anthropic_key,
            Provider::Gemini => &self.gemini_key,
            Provider::OpenAi => &self.openai_key,
        };
        key.as_deref().ok_or_else(|| {
            CompletionError::Configuration(format!("{} is not set", provider.key_variable()))
        })
    }

    async fn complete_anthropic(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = AnthropicRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .filter(|message| message.role == Role::User)
                .map(|message| ChatMessage {
                    role: "user".to_string(),
                    content: message.content.clone(),
                })
                .collect(),
            max_tokens: request.sampling.max_output_tokens,
            temperature: request.sampling.temperature,
            system: request.system_prompt(),
        };
        let builder = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", self.key_for(Provider::Anthropic)?)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: AnthropicResponse = send(builder, Provider::Anthropic).await?;
        response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| {
                CompletionError::InvalidResponse("Anthropic API returned no text content".into())
            })
    }

    async fn complete_openai(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = OpenAiRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|message| ChatMessage {
                    role: role_name(message.role).to_string(),
                    content: message.content.clone(),
                })
                .collect(),
            max_tokens: request.sampling.max_output_tokens,
            temperature: request.sampling.temperature,
        };
        let builder = self
            .client
            .post(format!("{}/chat/completions", self.openai_base_url))
            .bearer_auth(self.key_for(Provider::OpenAi)?)
            .json(&body);

        let response: OpenAiResponse = send(builder, Provider::OpenAi).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                CompletionError::InvalidResponse("OpenAI API returned no content".into())
            })
    }

    async fn complete_gemini(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: request.user_prompt(),
                }],
            }],
            system_instruction: request.system_prompt().map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: request.sampling.temperature,
                max_output_tokens: request.sampling.max_output_tokens,
            },
        };
        let url = format!(
            "{GEMINI_BASE_URL}/{model}:generateContent?key={key}",
            model = request.model,
            key = self.key_for(Provider::Gemini)?,
        );

        let response: GeminiResponse = send(self.client.post(url).json(&body), Provider::Gemini).await?;
        gemini_text(response)
    }
}

/// Text of the first candidate.
fn gemini_text(response: GeminiResponse) -> Result<String, CompletionError> {
    response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .ok_or_else(|| CompletionError::InvalidResponse("Gemini API returned no text in candidates".into()))
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let provider = Provider::detect(&request.model);
        debug!(
            model = %request.model,
            provider = provider.label(),
            messages = request.messages.len(),
            "Sending completion request"
        );
        match provider {
            Provider::Anthropic => self.complete_anthropic(&request).await,
            Provider::Gemini => self.complete_gemini(&request).await,
            Provider::OpenAi => self.complete_openai(&request).await,
        }
    }
}

async fn send<T: DeserializeOwned>(builder: RequestBuilder, provider: Provider) -> Result<T, CompletionError> {
    let response = builder.send().await.map_err(|err| CompletionError::Transport {
        message: format!("{} API request failed: {err}", provider.label()),
        is_retryable: err.is_connect() || err.is_timeout(),
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers().get("retry-after"));
        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| format!("Failed to read {} error body", provider.label()));
        return Err(map_http_error(status, body_text, retry_after));
    }

    response.json().await.map_err(|err| {
        CompletionError::InvalidResponse(format!("Failed to parse {} response: {err}", provider.label()))
    })
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    text: Option<String>,
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
}

/// Error envelope shared by all three providers: `{"error": {"message": ...}}`.
#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn map_http_error(status: StatusCode, body: String, retry_after: Option<Duration>) -> CompletionError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .and_then(|wrapper| {
            let message = wrapper.error.message?;
            Some(match wrapper.error.status {
                Some(status_text) if !status_text.is_empty() => format!("{status_text}: {message}"),
                _ => message,
            })
        })
        .unwrap_or(body);

    CompletionError::Http {
        status: status.as_u16(),
        message,
        retry_after,
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
