//! Chat Adapter: a thin reqwest client over a generic chat-completion endpoint, per
//! SPEC_FULL.md §4.15 / §6. Grounded in the reference client's `backend.rs` (typed
//! request/response structs, `res.json().await?`, status-code branch to a typed error).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: &'static str,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a `system` message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    /// Build a `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: String,
    #[serde(default)]
    usage: Option<Usage>,
}

/// Result of one chat-completion call.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// Raw model output text.
    pub content: String,
    /// Billed input (prompt) tokens.
    pub input_tokens: u32,
    /// Billed output (completion) tokens.
    pub output_tokens: u32,
}

/// What one Chat Adapter call needs.
#[derive(Debug, Clone)]
pub struct ChatRequestParams {
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Max tokens the model may emit.
    pub max_tokens: u32,
}

/// The chat-completion endpoint, per SPEC_FULL.md §6.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Issue one chat-completion call.
    async fn complete(&self, params: ChatRequestParams) -> Result<ChatReply>;
}

/// HTTP implementation of `ChatClient` over a generic chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    api_key: String,
}

impl HttpChatClient {
    /// Build a new client. `http` is expected to be shared process-wide (cheaply cloneable).
    pub fn new(http: reqwest::Client, base_url: reqwest::Url, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(&self, params: ChatRequestParams) -> Result<ChatReply> {
        let body = ChatRequest {
            messages: params.messages,
            model: params.model,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let res = self
            .http
            .post(self.base_url.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::Chat(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("HTTP {status}: {detail}")));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|err| Error::Chat(format!("malformed chat response: {err}")))?;

        let usage = parsed.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        Ok(ChatReply {
            content: parsed.content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }
}
