//! The tool-calling agent loop.
//!
//! One turn is at most two completion requests: the first with the
//! registry's tool descriptors, and (only when the model asked for tools)
//! a follow-up with the tool results and no tools.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::conversation::{message_metadata, ConversationStore};
use crate::models::{ChatMessage, ModelProvider, ProviderResponse, TokenUsage, ToolCall};
use crate::tools::ToolRegistry;

/// Failure of a whole turn.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The completion capability failed; the turn has no reply.
    #[error("completion request failed: {0:#}")]
    Completion(anyhow::Error),

    /// The bound conversation store could not be read or written.
    #[error("conversation persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

struct Binding {
    store: Arc<dyn ConversationStore>,
    conversation_id: String,
}

/// A conversation with a model, driven one turn at a time.
///
/// Each agent owns its history; independent conversations use
/// independent agents.
pub struct Agent {
    registry: Arc<ToolRegistry>,
    history: Vec<ChatMessage>,
    binding: Option<Binding>,
    usage: TokenUsage,
}

impl Agent {
    /// An unbound agent whose history starts with `system_prompt`, if any.
    pub fn new(registry: Arc<ToolRegistry>, system_prompt: Option<&str>) -> Self {
        Self {
            registry,
            history: system_prompt.map(ChatMessage::system).into_iter().collect(),
            binding: None,
            usage: TokenUsage::default(),
        }
    }

    /// An agent bound to a stored conversation.
    ///
    /// Prior messages are loaded as history; every message appended from
    /// now on is persisted.  An empty conversation gets `system_prompt`
    /// as its first message.
    pub fn resume(
        registry: Arc<ToolRegistry>,
        system_prompt: Option<&str>,
        store: Arc<dyn ConversationStore>,
        conversation_id: &str,
    ) -> Result<Self, AgentError> {
        let conversation = store
            .get(conversation_id)
            .map_err(AgentError::Persistence)?
            .ok_or_else(|| {
                AgentError::Persistence(anyhow::anyhow!(
                    "conversation {conversation_id} not found"
                ))
            })?;

        let mut agent = Self {
            registry,
            history: conversation.chat_history(),
            binding: Some(Binding {
                store,
                conversation_id: conversation_id.to_string(),
            }),
            usage: TokenUsage::default(),
        };
        debug!(
            conversation = %conversation_id,
            messages = agent.history.len(),
            "conversation resumed"
        );

        if agent.history.is_empty() {
            if let Some(prompt) = system_prompt {
                agent.append(ChatMessage::system(prompt))?;
            }
        }
        Ok(agent)
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.conversation_id.as_str())
    }

    /// Token usage summed over every completion this agent made.
    pub fn usage(&self) -> &TokenUsage {
        &self.usage
    }

    fn append(&mut self, msg: ChatMessage) -> Result<(), AgentError> {
        if let Some(ref b) = self.binding {
            b.store
                .append_message(
                    &b.conversation_id,
                    msg.role,
                    msg.content.as_deref(),
                    &message_metadata(&msg),
                )
                .map_err(AgentError::Persistence)?;
        }
        self.history.push(msg);
        Ok(())
    }

    async fn request(
        &mut self,
        provider: &dyn ModelProvider,
        tools: &[Value],
    ) -> Result<ProviderResponse, AgentError> {
        let (response, usage) = provider
            .complete(&self.history, tools)
            .await
            .map_err(AgentError::Completion)?;
        if let Some(u) = usage {
            self.usage.prompt_tokens += u.prompt_tokens;
            self.usage.completion_tokens += u.completion_tokens;
            self.usage.total_tokens += u.total_tokens;
        }
        Ok(response)
    }

    /// Run one user turn and return the agent's reply text.
    pub async fn run_turn(
        &mut self,
        provider: &dyn ModelProvider,
        message: &str,
    ) -> Result<String, AgentError> {
        info!(
            conversation = self.conversation_id().unwrap_or("-"),
            tools = self.registry.len(),
            "agent turn started"
        );
        self.append(ChatMessage::user(message))?;

        let descriptors = self.registry.list();
        let (content, calls) = match self.request(provider, &descriptors).await? {
            ProviderResponse::Final(text) => {
                self.append(ChatMessage::agent(text.clone()))?;
                info!(reply_len = text.len(), "agent turn completed");
                return Ok(text);
            }
            ProviderResponse::ToolCalls { content, calls } => (content, calls),
        };

        let calls: Vec<ToolCall> = calls
            .into_iter()
            .map(|mut c| {
                if c.id.is_empty() {
                    c.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                }
                c
            })
            .collect();
        self.append(ChatMessage::agent_tool_calls(content, calls.clone()))?;

        for call in &calls {
            if !self.registry.contains(&call.name) {
                debug!(tool = %call.name, "skipping call to unknown tool");
                continue;
            }
            debug!(tool = %call.name, call_id = %call.id, "invoking tool");
            let result = self.dispatch(call).await;
            self.append(ChatMessage::tool_result(call, result))?;
        }

        let reply = match self.request(provider, &[]).await? {
            ProviderResponse::Final(text) => text,
            ProviderResponse::ToolCalls { content, calls } => {
                warn!(
                    ignored = calls.len(),
                    "follow-up completion requested tools, ignoring"
                );
                content.unwrap_or_default()
            }
        };
        self.append(ChatMessage::agent(reply.clone()))?;
        info!(reply_len = reply.len(), tool_calls = calls.len(), "agent turn completed");
        Ok(reply)
    }

    /// Run one known tool; failures become an `{"error": …}` result.
    async fn dispatch(&self, call: &ToolCall) -> String {
        let args = if call.arguments.trim().is_empty() {
            Ok(json!({}))
        } else {
            serde_json::from_str::<Value>(&call.arguments)
        };
        let outcome = match args {
            Ok(args) => self
                .registry
                .run(&call.name, args)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("invalid arguments for tool '{}': {e}", call.name)),
        };
        match outcome {
            Ok(v) => v.to_string(),
            Err(msg) => {
                warn!(tool = %call.name, error = %msg, "tool call failed, feeding error back");
                json!({ "error": msg }).to_string()
            }
        }
    }
}
