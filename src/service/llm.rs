//! Chat-completion backend client.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint (Together AI by
//! default). The rest of the service only sees the [`ChatCompletionBackend`]
//! trait, so the network client can be swapped for a scripted double in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: String) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content,
        }
    }

    pub fn user(content: String) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content,
        }
    }

    pub fn assistant(content: String) -> Self {
        ChatMessage {
            role: "assistant".to_string(),
            content,
        }
    }
}

/// Token usage as reported by the backend. Absent fields count as zero so a
/// provider that omits usage data never blocks billing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: i32,
    #[serde(default)]
    pub completion_tokens: i32,
    #[serde(default)]
    pub total_tokens: i32,
}

/// One completed model call: the raw text plus what it cost.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Usage,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model backend communication failed: {0}")]
    Communication(String),
    #[error("model returned an empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait ChatCompletionBackend: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<ChatCompletion, LlmError>;
}

/// Production backend over reqwest.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Communication(format!("failed to build HTTP client: {}", e)))?;
        Ok(LlmClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

fn parse_completion(body: &serde_json::Value) -> Result<ChatCompletion, LlmError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if content.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    let usage = body
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
        .unwrap_or_default();

    Ok(ChatCompletion {
        content: content.to_string(),
        usage,
    })
}

#[async_trait]
impl ChatCompletionBackend for LlmClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<ChatCompletion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        // Temperature 0 keeps the translation as deterministic as the
        // provider allows; json_object mode nudges well-formed output.
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::Communication(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(LlmError::Communication(format!(
                "backend returned {}: {}",
                status, snippet
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Communication(format!("invalid response body: {}", e)))?;

        let completion = parse_completion(&body)?;
        debug!(
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "chat completion received"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_content_and_usage() {
        let body = json!({
            "choices": [{ "message": { "content": "{\"sql\":\"SELECT 1\"}" } }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150 }
        });
        let completion = parse_completion(&body).unwrap();
        assert_eq!(completion.content, "{\"sql\":\"SELECT 1\"}");
        assert_eq!(completion.usage.total_tokens, 150);
    }

    #[test]
    fn missing_usage_defaults_to_zero() {
        let body = json!({
            "choices": [{ "message": { "content": "answer" } }]
        });
        let completion = parse_completion(&body).unwrap();
        assert_eq!(completion.usage.prompt_tokens, 0);
        assert_eq!(completion.usage.total_tokens, 0);
    }

    #[test]
    fn partial_usage_fills_absent_fields() {
        let body = json!({
            "choices": [{ "message": { "content": "answer" } }],
            "usage": { "total_tokens": 42 }
        });
        let completion = parse_completion(&body).unwrap();
        assert_eq!(completion.usage.total_tokens, 42);
        assert_eq!(completion.usage.completion_tokens, 0);
    }

    #[test]
    fn blank_content_is_an_empty_response() {
        let body = json!({
            "choices": [{ "message": { "content": "   " } }]
        });
        assert!(matches!(
            parse_completion(&body),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn missing_choices_is_an_empty_response() {
        let body = json!({ "usage": { "total_tokens": 5 } });
        assert!(matches!(
            parse_completion(&body),
            Err(LlmError::EmptyResponse)
        ));
    }
}
