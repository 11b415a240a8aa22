//! Component I — Brain Client contract.
//!
//! The brain is treated as a non-concurrent resource: at most one in-flight
//! call at a time across the core (`spec.md` §5, §9). `BrainClient` is a
//! trait so the enricher (component E) is testable without a real network
//! call.

use crate::error::BrainError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrainRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

#[async_trait]
pub trait BrainClient: Send + Sync {
    /// Returns the assistant content string, or `None` when the brain
    /// responded but produced nothing usable (empty choices). Never panics;
    /// network/HTTP/parse failures surface as `Err`.
    async fn complete(&self, request: BrainRequest) -> Result<Option<String>, BrainError>;
}

pub struct HttpBrainClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: std::time::Duration,
}

impl HttpBrainClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl BrainClient for HttpBrainClient {
    async fn complete(&self, request: BrainRequest) -> Result<Option<String>, BrainError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionsBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let mut req = self.client.post(&url).timeout(self.timeout).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(BrainError::Status(response.status().as_u16()));
        }

        let parsed: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| BrainError::Malformed(e.to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("x").role, "system");
        assert_eq!(ChatMessage::user("x").role, "user");
    }
}
