//! Language-model collaborator.
//!
//! The orchestrator only needs one capability from a model: given the system instructions,
//! the prior turns of a conversation and the new user text, return the reply text. That is
//! [`LanguageModel`]. [`OpenAiChatClient`] implements it against any OpenAI-compatible
//! `/chat/completions` endpoint.

use crate::config::ModelConfig;
use crate::error::ModelError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

/// One message of an intake conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
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

/// Text-in, text-out chat model.
pub trait LanguageModel: Send + Sync {
    /// Reply to `input` given `system` instructions and the prior `history`, oldest first.
    fn complete(
        &self,
        system: &str,
        history: &[ChatTurn],
        input: &str,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}

/// OpenAI-compatible chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat client for an OpenAI-compatible API.
///
/// Requests are sent once with the configured timeout; there are no retries. A failed call
/// is returned to the caller as [`ModelError`].
#[derive(Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(config.timeout)
            .build()?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        tracing::info!(endpoint = %endpoint, model = %config.model, "chat model client created");

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.as_str().to_owned(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

/// System message, then the history, then the new user text.
fn build_messages(system: &str, history: &[ChatTurn], input: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: "system".to_owned(),
        content: system.to_owned(),
    });
    messages.extend(history.iter().map(|turn| ChatMessage {
        role: match turn.role {
            Role::Human => "user",
            Role::Assistant => "assistant",
        }
        .to_owned(),
        content: turn.content.clone(),
    }));
    messages.push(ChatMessage {
        role: "user".to_owned(),
        content: input.to_owned(),
    });
    messages
}

impl LanguageModel for OpenAiChatClient {
    async fn complete(
        &self,
        system: &str,
        history: &[ChatTurn],
        input: &str,
    ) -> Result<String, ModelError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: build_messages(system, history, input),
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, "chat model returned an error status");
            return Err(ModelError::Status { status, body });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ModelError::EmptyResponse)?;

        tracing::debug!(
            turns = history.len(),
            reply_chars = content.chars().count(),
            "chat model replied"
        );
        Ok(content)
    }
}
