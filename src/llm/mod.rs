//! LLM integration for inbox-sweep.
//!
//! The classifier talks to a model through the [`LlmProvider`] trait so the
//! pipeline can be exercised with a stub. The shipped backend is a local
//! Ollama server ([`OllamaProvider`]), reached through rig-core; the
//! [`RigAdapter`] bridges rig's `CompletionModel` to our trait.

pub mod ollama;
mod rig_adapter;

pub use ollama::OllamaProvider;
pub use rig_adapter::RigAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Who a chat message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request: messages plus sampling settings.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated system messages, blank-line separated.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Concatenated non-system messages, blank-line separated.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Unknown,
}

/// Model output for a [`CompletionRequest`].
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// A text completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Fails when the backend cannot serve requests. Defaults to ready.
    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_and_prompt_text_split_by_role() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Is this needed?"),
            ChatMessage::system("Answer YES or NO."),
        ])
        .with_temperature(0.0);

        assert_eq!(
            request.system_text().as_deref(),
            Some("Be brief.\n\nAnswer YES or NO.")
        );
        assert_eq!(request.prompt_text(), "Is this needed?");
        assert_eq!(request.temperature, Some(0.0));
    }

    #[test]
    fn no_system_messages() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        assert!(request.system_text().is_none());
        assert!(request.max_tokens.is_none());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
