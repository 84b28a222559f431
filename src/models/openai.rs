//! OpenAI chat-completions provider.

use std::any::Any;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{ChatMessage, ModelProvider, ProviderResponse, TokenUsage};
use crate::config::ModelConfig;

/// Default endpoint for OpenAI chat completions.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Provider that talks to an OpenAI-compatible chat completions API.
pub struct OpenAIProvider {
    api_key: String,
    endpoint: String,
    client: Client,
    /// Model name sent in the request body (e.g. "gpt-4").
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl OpenAIProvider {
    /// Create a provider with explicit configuration.
    pub fn with_config(api_key: String, endpoint: String, model: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_key,
            endpoint,
            client,
            model,
            temperature: None,
            max_tokens: None,
        })
    }

    /// Create a provider from the `model` config section.
    pub fn from_config(cfg: &ModelConfig, api_key: String) -> anyhow::Result<Self> {
        let endpoint = cfg
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Ok(Self::with_config(api_key, endpoint, cfg.model.clone())?
            .temperature(cfg.temperature)
            .max_tokens(cfg.max_tokens))
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request body for one completion.  `tools` and `tool_choice` are
    /// only present when there is at least one tool.
    pub fn request_body(&self, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": super::serialize_messages(messages),
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(n) = self.max_tokens {
            body["max_tokens"] = json!(n);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        let body = self.request_body(messages, tools);
        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending completion request"
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API returned {status}: {text}");
        }

        let json: Value = resp.json().await.context("invalid OpenAI response body")?;
        let usage = super::parse_token_usage(&json);
        Ok((super::parse_completion(&json)?, usage))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAIProvider {
        OpenAIProvider::with_config(
            "sk-test".into(),
            "http://localhost:1234/v1/chat/completions".into(),
            "gpt-4".into(),
        )
        .unwrap()
    }

    #[test]
    fn body_without_tools_has_no_tool_choice() {
        let p = provider().temperature(0.7).max_tokens(Some(1000));
        let body = p.request_body(&[ChatMessage::user("Hello")], &[]);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn body_with_tools_requests_auto_choice() {
        let tool = json!({ "type": "function", "function": { "name": "t" } });
        let body = provider().request_body(&[ChatMessage::user("Hi")], &[tool]);
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
        assert_eq!(body["tool_choice"], "auto");
        assert!(body.get("temperature").is_none());
    }
}
