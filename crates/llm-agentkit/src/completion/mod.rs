//! The completion service boundary.
//!
//! The pipeline only needs one capability from a text-generation backend:
//! turn a model id, a list of messages and sampling parameters into text.
//! [`CompletionService`] is that capability; [`HttpCompletionClient`] is the
//! bundled implementation over the Anthropic, OpenAI and Gemini HTTP APIs.
//!
//! # Example
//!
//! ```rust
//! use llm_agentkit::completion::{CompletionError, CompletionRequest, CompletionService};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl CompletionService for Echo {
//!     async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
//!         Ok(request.user_prompt())
//!     }
//! }
//! ```

pub mod error;
#[cfg(feature = "http")]
pub mod http;

pub use self::error::CompletionError;
#[cfg(feature = "http")]
pub use self::http::{HttpCompletionClient, Provider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling settings sent with a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl SamplingParams {
    pub fn new(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
        }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::new(0.7, 4096)
    }
}

/// One completion request: `{modelId, messages, temperature, maxOutputTokens}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub sampling: SamplingParams,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            sampling: SamplingParams::default(),
        }
    }

    /// Adds a system message unless `content` is empty.
    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.messages.push(Message::system(content));
        }
        self
    }

    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// System messages joined by blank lines, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let parts = self.contents(Role::System);
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// User messages joined by blank lines.
    pub fn user_prompt(&self) -> String {
        self.contents(Role::User).join("\n\n")
    }

    fn contents(&self, role: Role) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|message| message.role == role)
            .map(|message| message.content.as_str())
            .collect()
    }
}

/// Produces text for a [`CompletionRequest`].
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

    /// Like [`complete`](Self::complete), reporting text chunks to `on_delta`
    /// as they arrive. Returns the full text.
    ///
    /// The default implementation reports the whole reply as one chunk.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        on_delta: &(dyn for<'d> Fn(&'d str) + Send + Sync),
    ) -> Result<String, CompletionError> {
        let text = self.complete(request).await?;
        on_delta(&text);
        Ok(text)
    }
}
