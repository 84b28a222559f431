//! Model provider abstractions.
//!
//! Defines the [`ModelProvider`] completion capability, the [`ChatMessage`]
//! history type, [`ProviderManager`] for retry / fallback at the boundary,
//! and the concrete providers ([`OpenAIProvider`], [`StubProvider`]).

pub mod openai;

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::ModelConfig;

pub use openai::OpenAIProvider;

// ---------------------------------------------------------------------------
// ChatMessage – shared message representation
// ---------------------------------------------------------------------------

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Agent,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Agent => "agent",
            Role::Tool => "tool",
        }
    }

    /// Role name understood by chat-completions APIs.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Role::Agent => "assistant",
            other => other.as_str(),
        }
    }

    /// Parse a stored or wire role name.  `assistant` maps to [`Role::Agent`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "agent" | "assistant" => Some(Role::Agent),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool-call id assigned by the API.
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments exactly as the model produced them.
    pub arguments: String,
}

/// A single chat message.
///
/// `content` is `None` on agent messages that only carry tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `tool` messages: the id of the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For `tool` messages: the tool that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Plain message with no tool metadata.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(Role::Agent, content)
    }

    /// Agent message announcing the tool calls that follow.
    pub fn agent_tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Agent,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
            name: None,
        }
    }

    /// Result of one executed tool call.
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
        }
    }
}

/// Serialise messages into the chat-completions JSON array format.
pub fn serialize_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": m.role.wire_name(),
                "content": m.content,
            });
            if let Some(ref calls) = m.tool_calls {
                msg["tool_calls"] = calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.arguments },
                        })
                    })
                    .collect();
            }
            if let Some(ref id) = m.tool_call_id {
                msg["tool_call_id"] = json!(id);
            }
            if let Some(ref name) = m.name {
                msg["name"] = json!(name);
            }
            msg
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ProviderResponse – tool-calling aware response
// ---------------------------------------------------------------------------

/// Token usage statistics returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Outcome of one completion request.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    /// Plain text reply from the model.
    Final(String),
    /// The model wants tools run.  `content` is any text sent alongside.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// Extract token usage statistics from a chat-completions response.
pub fn parse_token_usage(json: &Value) -> Option<TokenUsage> {
    let usage = json.get("usage")?;
    Some(TokenUsage {
        prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: usage["total_tokens"].as_u64().unwrap_or(0),
    })
}

/// Parse the tool calls of a chat-completions `message` object.
///
/// Reads the `tool_calls` array, falling back to the legacy single
/// `function_call` field.  Entries without a function name are dropped.
pub fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        return tool_calls
            .iter()
            .filter_map(|tc| {
                let func = tc.get("function")?;
                Some(ToolCall {
                    id: tc
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: func.get("name")?.as_str()?.to_string(),
                    arguments: func
                        .get("arguments")
                        .and_then(Value::as_str)
                        .unwrap_or("{}")
                        .to_string(),
                })
            })
            .collect();
    }

    if let Some(fc) = message.get("function_call").and_then(Value::as_object) {
        if let Some(name) = fc.get("name").and_then(Value::as_str) {
            return vec![ToolCall {
                id: String::new(),
                name: name.to_string(),
                arguments: fc
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}")
                    .to_string(),
            }];
        }
    }

    Vec::new()
}

/// Turn a full chat-completions response body into a [`ProviderResponse`].
pub fn parse_completion(json: &Value) -> anyhow::Result<ProviderResponse> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow::anyhow!("completion response has no choices"))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);
    let calls = parse_tool_calls(message);
    if calls.is_empty() {
        Ok(ProviderResponse::Final(content.unwrap_or_default()))
    } else {
        Ok(ProviderResponse::ToolCalls {
            content: content.filter(|c| !c.is_empty()),
            calls,
        })
    }
}

// ---------------------------------------------------------------------------
// ModelProvider trait
// ---------------------------------------------------------------------------

/// The external completion capability.
///
/// Given the message history and the exported tool descriptors, returns
/// either a final reply or a list of tool calls.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Request one completion.  An empty `tools` slice sends no tools.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)>;

    /// Downcast helper so callers can check the concrete type.
    fn as_any(&self) -> &dyn Any;
}

// ---------------------------------------------------------------------------
// ProviderManager – retry / fallback wrapper
// ---------------------------------------------------------------------------

/// Ordered list of providers with per-provider retry and fallback to the
/// next provider once a provider's attempts are exhausted.
///
/// Implements [`ModelProvider`] itself, so the agent loop stays unaware
/// of retries.
pub struct ProviderManager {
    providers: Vec<Box<dyn ModelProvider>>,
    max_attempts: usize,
}

impl ProviderManager {
    /// `max_attempts` is per provider and clamped to at least 1.
    pub fn new(providers: Vec<Box<dyn ModelProvider>>, max_attempts: usize) -> Self {
        Self {
            providers,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Exponential backoff (100 ms × 2^attempt) between attempts.
    /// Permanent errors (400, 401, 403, 404, 422) skip straight to the
    /// next provider.
    async fn complete_with_retry(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        let mut last_err = anyhow::anyhow!("no providers configured");

        for (idx, provider) in self.providers.iter().enumerate() {
            for attempt in 0..self.max_attempts {
                match provider.complete(messages, tools).await {
                    Ok(out) => return Ok(out),
                    Err(e) => {
                        let permanent = is_permanent_error(&e);
                        warn!(
                            provider_idx = idx,
                            attempt = attempt + 1,
                            max_attempts = self.max_attempts,
                            permanent,
                            error = %e,
                            "completion request failed"
                        );
                        last_err = e;
                        if permanent {
                            break;
                        }
                        if attempt + 1 < self.max_attempts {
                            let delay = Duration::from_millis(100 * 2u64.pow(attempt as u32));
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
            if idx + 1 < self.providers.len() {
                warn!(provider_idx = idx, "provider exhausted, trying next provider");
            }
        }

        Err(last_err.context("all providers exhausted"))
    }
}

/// Whether an error is an HTTP failure that retrying cannot fix.
///
/// Matches messages like `"OpenAI API returned 401 Unauthorized: …"`.
fn is_permanent_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    ["400", "401", "403", "404", "422"]
        .iter()
        .any(|code| msg.contains(&format!("returned {code}")))
}

#[async_trait]
impl ModelProvider for ProviderManager {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        self.complete_with_retry(messages, tools).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// StubProvider – offline development fallback
// ---------------------------------------------------------------------------

/// Echoes the last user message and never calls tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubProvider;

#[async_trait]
impl ModelProvider for StubProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[Value],
    ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        Ok((ProviderResponse::Final(format!("[stub] echo: {last_user}")), None))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Provider factory
// ---------------------------------------------------------------------------

/// Build the provider named by `cfg.provider`.
///
/// * `openai` → [`OpenAIProvider`]; without an API key it degrades to
///   [`StubProvider`] with a warning.
/// * `stub` → [`StubProvider`].
pub fn build_provider(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match cfg.provider.as_str() {
        "openai" => {
            let key = resolve_config_key(cfg.api_key.as_deref(), &cfg.provider);
            if key.is_empty() {
                warn!("provider \"openai\" requested but no API key configured, using stub");
                return Ok(Box::new(StubProvider));
            }
            let provider = OpenAIProvider::from_config(cfg, key)?;
            info!(model = provider.model(), "using openai provider");
            Ok(Box::new(provider))
        }
        "stub" => Ok(Box::new(StubProvider)),
        other => anyhow::bail!("unknown model provider: {other}"),
    }
}

/// Build a [`ProviderManager`] around the configured provider.
pub fn build_provider_manager(cfg: &ModelConfig) -> anyhow::Result<ProviderManager> {
    let manager = ProviderManager::new(vec![build_provider(cfg)?], cfg.max_retries);
    debug!(
        providers = manager.provider_count(),
        max_attempts = manager.max_attempts(),
        "provider manager ready"
    );
    Ok(manager)
}

/// Resolve an API key: config value → `<PROVIDER>_API_KEY` env var → empty.
///
/// A config value starting with `$` is an env-var reference.
pub fn resolve_config_key(config_key: Option<&str>, provider_id: &str) -> String {
    if let Some(k) = config_key {
        if let Some(var) = k.strip_prefix('$') {
            return std::env::var(var).unwrap_or_default();
        }
        if !k.is_empty() {
            return k.to_string();
        }
    }
    let env_name = format!("{}_API_KEY", provider_id.to_uppercase().replace('-', "_"));
    std::env::var(env_name).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Flaky {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
        error: &'static str,
    }

    #[async_trait]
    impl ModelProvider for Flaky {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[Value],
        ) -> anyhow::Result<(ProviderResponse, Option<TokenUsage>)> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                anyhow::bail!("{}", self.error);
            }
            Ok((ProviderResponse::Final("ok".into()), None))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn agent_role_goes_out_as_assistant() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "track_activity".into(),
            arguments: "{}".into(),
        };
        let msgs = vec![
            ChatMessage::user("hi"),
            ChatMessage::agent_tool_calls(None, vec![call.clone()]),
            ChatMessage::tool_result(&call, "{\"ok\":true}"),
        ];
        let wire = serialize_messages(&msgs);
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[1]["role"], "assistant");
        assert!(wire[1]["content"].is_null());
        assert_eq!(wire[1]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[1]["tool_calls"][0]["function"]["name"], "track_activity");
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "call_1");
        assert_eq!(wire[2]["name"], "track_activity");
    }

    #[test]
    fn role_parse_accepts_wire_and_stored_names() {
        assert_eq!(Role::parse("assistant"), Some(Role::Agent));
        assert_eq!(Role::parse("agent"), Some(Role::Agent));
        assert_eq!(Role::parse("tool"), Some(Role::Tool));
        assert_eq!(Role::parse("robot"), None);
    }

    #[test]
    fn parse_completion_final_and_tool_calls() {
        let final_reply = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hi there!" } }]
        });
        assert_eq!(
            parse_completion(&final_reply).unwrap(),
            ProviderResponse::Final("Hi there!".into())
        );

        let calls = json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    { "id": "a", "type": "function", "function": { "name": "x", "arguments": "{\"n\":1}" } },
                    { "id": "b", "type": "function", "function": { "name": "y" } }
                ]
            } }]
        });
        match parse_completion(&calls).unwrap() {
            ProviderResponse::ToolCalls { content, calls } => {
                assert!(content.is_none());
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].arguments, "{\"n\":1}");
                assert_eq!(calls[1].arguments, "{}");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }

        assert!(parse_completion(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn legacy_function_call_is_understood() {
        let msg = json!({ "function_call": { "name": "f", "arguments": "{}" } });
        let calls = parse_tool_calls(&msg);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "f");
        assert!(calls[0].id.is_empty());
    }

    #[tokio::test]
    async fn manager_retries_transient_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pm = ProviderManager::new(
            vec![Box::new(Flaky {
                calls: calls.clone(),
                fail_first: 1,
                error: "OpenAI API returned 503 Service Unavailable: busy",
            })],
            2,
        );
        let (resp, _) = pm.complete(&[ChatMessage::user("x")], &[]).await.unwrap();
        assert_eq!(resp, ProviderResponse::Final("ok".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn manager_does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pm = ProviderManager::new(
            vec![Box::new(Flaky {
                calls: calls.clone(),
                fail_first: 10,
                error: "OpenAI API returned 401 Unauthorized: bad key",
            })],
            3,
        );
        let err = pm.complete(&[ChatMessage::user("x")], &[]).await.unwrap_err();
        assert!(format!("{err:#}").contains("401"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn manager_falls_back_to_next_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pm = ProviderManager::new(
            vec![
                Box::new(Flaky {
                    calls: calls.clone(),
                    fail_first: 10,
                    error: "OpenAI API returned 404 Not Found",
                }),
                Box::new(StubProvider),
            ],
            1,
        );
        let (resp, _) = pm.complete(&[ChatMessage::user("ping")], &[]).await.unwrap();
        assert_eq!(resp, ProviderResponse::Final("[stub] echo: ping".into()));
    }

    #[test]
    fn resolve_config_key_plain_and_env() {
        assert_eq!(resolve_config_key(Some("my-secret"), "test"), "my-secret");
        std::env::set_var("AIDECK_TEST_RESOLVE_KEY", "from_env");
        assert_eq!(
            resolve_config_key(Some("$AIDECK_TEST_RESOLVE_KEY"), "test"),
            "from_env"
        );
        std::env::remove_var("AIDECK_TEST_RESOLVE_KEY");
        assert_eq!(resolve_config_key(None, "nonexistent_provider_xyz"), "");
    }

    #[test]
    fn factory_selects_provider() {
        let mut cfg = ModelConfig {
            provider: "stub".into(),
            ..ModelConfig::default()
        };
        let p = build_provider(&cfg).unwrap();
        assert!(p.as_any().downcast_ref::<StubProvider>().is_some());

        cfg.provider = "openai".into();
        cfg.api_key = Some("sk-test".into());
        cfg.model = "gpt-4o-mini".into();
        let p = build_provider(&cfg).unwrap();
        let openai = p.as_any().downcast_ref::<OpenAIProvider>().unwrap();
        assert_eq!(openai.model(), "gpt-4o-mini");

        cfg.provider = "carrier-pigeon".into();
        assert!(build_provider(&cfg).is_err());
    }

    #[test]
    fn manager_factory_uses_max_retries() {
        let cfg = ModelConfig {
            provider: "stub".into(),
            max_retries: 3,
            ..ModelConfig::default()
        };
        let manager = build_provider_manager(&cfg).unwrap();
        assert_eq!(manager.provider_count(), 1);
        assert_eq!(manager.max_attempts(), 3);

        let empty = ProviderManager::new(Vec::new(), 0);
        assert_eq!(empty.provider_count(), 0);
        assert_eq!(empty.max_attempts(), 1);
    }
}
