//! Tool definitions and the tool registry.
//!
//! A [`Tool`] couples a name, a description and a JSON-Schema parameter
//! descriptor with an async handler.  Tools are collected in a
//! [`ToolRegistry`] owned by the caller; the agent loop exports the
//! registry's descriptors to the completion API and dispatches the
//! tool calls it gets back.

pub mod builtins;
pub mod schema;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

pub use schema::{build_parameters, ParamSpec, ParamType, Signature};

/// Async handler invoked with the call's JSON object of arguments.
pub type ToolHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>> + Send + Sync,
>;

/// Wrap an async closure as a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Errors surfaced by tool construction and execution.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ToolError {
    /// Parameter schema and handler signature disagree.
    #[error("tool '{tool}' has a signature mismatch: {message}")]
    SignatureMismatch { tool: String, message: String },

    /// Anything that went wrong while running a tool.
    #[error("error running tool '{tool}': {message}")]
    Execution { tool: String, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    fn execution(tool: &str, message: impl Into<String>) -> Self {
        ToolError::Execution {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

// ── Tool ─────────────────────────────────────────────────────

/// A named, schema-described callable the agent can invoke.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    parameters: Value,
    signature: Signature,
    handler: ToolHandler,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl Tool {
    /// Create a tool with an explicitly supplied parameter schema.
    ///
    /// The schema's properties are checked against `signature`; any
    /// disagreement is a [`ToolError::SignatureMismatch`].
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        signature: Signature,
        handler: ToolHandler,
    ) -> Result<Self, ToolError> {
        let tool = Self {
            name: name.into(),
            description: description.into(),
            parameters,
            signature,
            handler,
        };
        tool.validate_signature()?;
        Ok(tool)
    }

    /// Create a tool whose schema is synthesised from its signature.
    ///
    /// `doc` becomes the description and is scanned for per-parameter
    /// `name: description` lines.
    pub fn from_signature(
        name: impl Into<String>,
        doc: &str,
        signature: Signature,
        handler: ToolHandler,
    ) -> Result<Self, ToolError> {
        let parameters = build_parameters(&signature, Some(doc));
        Self::new(name, doc.trim(), parameters, signature, handler)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Public descriptor in the function-calling export format.
    pub fn descriptor(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    fn validate_signature(&self) -> Result<(), ToolError> {
        let mismatch = |message: String| ToolError::SignatureMismatch {
            tool: self.name.clone(),
            message,
        };

        let schema_params: BTreeSet<&str> = self
            .parameters
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default();
        let declared: BTreeSet<&str> = self
            .signature
            .params
            .iter()
            .map(|p| p.name.as_str())
            .collect();

        let missing: Vec<&str> = schema_params.difference(&declared).copied().collect();
        if !missing.is_empty() {
            return Err(mismatch(format!(
                "handler is missing parameters: {}",
                missing.join(", ")
            )));
        }

        let extra: Vec<&str> = declared.difference(&schema_params).copied().collect();
        if !extra.is_empty() && !self.signature.accepts_extra {
            return Err(mismatch(format!(
                "handler has parameters not in schema: {}",
                extra.join(", ")
            )));
        }

        let required = self
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        for name in required {
            match self.signature.param(name) {
                Some(p) if !p.has_default => {}
                Some(_) => {
                    return Err(mismatch(format!(
                        "`{name}` is required by the schema but has a default"
                    )))
                }
                None => {
                    return Err(mismatch(format!(
                        "`{name}` is required by the schema but not declared"
                    )))
                }
            }
        }

        Ok(())
    }

    /// Bind `args` against the signature the way keyword arguments bind.
    fn check_arguments(&self, args: &Value) -> Result<(), ToolError> {
        let empty = serde_json::Map::new();
        let obj = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ToolError::execution(
                    &self.name,
                    format!("arguments must be a JSON object, got {other}"),
                ))
            }
        };

        for param in &self.signature.params {
            if !param.has_default && !obj.contains_key(&param.name) {
                return Err(ToolError::execution(
                    &self.name,
                    format!("missing required argument `{}`", param.name),
                ));
            }
        }

        if !self.signature.accepts_extra {
            if let Some(unexpected) = obj.keys().find(|k| self.signature.param(k).is_none()) {
                return Err(ToolError::execution(
                    &self.name,
                    format!("unexpected argument `{unexpected}`"),
                ));
            }
        }

        Ok(())
    }

    /// Execute the handler.
    ///
    /// Every failure, whatever its source, comes back as
    /// [`ToolError::Execution`] carrying this tool's name.
    pub async fn run(&self, args: Value) -> Result<Value, ToolError> {
        self.check_arguments(&args)?;
        let args = if args.is_null() { json!({}) } else { args };
        (self.handler)(args).await.map_err(|e| {
            warn!(tool = %self.name, error = %e, "tool execution failed");
            ToolError::execution(&self.name, format!("{e:#}"))
        })
    }
}

// ── Registry ─────────────────────────────────────────────────

/// Name-keyed collection of tools.
///
/// Registering a name twice keeps the last registration.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose [`run`](Self::run) gives up on a tool after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Add a tool, replacing (with a warning) any tool of the same name.
    pub fn register(&mut self, tool: Tool) {
        if self.tools.contains_key(tool.name()) {
            warn!(tool = %tool.name(), "tool already registered, overwriting");
        }
        debug!(tool = %tool.name(), "registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Build a tool from a declared signature and register it.
    pub fn register_fn(
        &mut self,
        name: &str,
        doc: &str,
        signature: Signature,
        handler: ToolHandler,
    ) -> Result<(), ToolError> {
        let tool = Tool::from_signature(name, doc, signature, handler)?;
        self.register(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Descriptors for every registered tool, ordered by name.
    pub fn list(&self) -> Vec<Value> {
        self.tools.values().map(Tool::descriptor).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Run the named tool, honouring the registry timeout.
    pub async fn run(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, tool.run(args))
                .await
                .unwrap_or_else(|_| {
                    warn!(tool = %name, timeout_ms = limit.as_millis() as u64, "tool timed out");
                    Err(ToolError::execution(
                        name,
                        format!("timed out after {}s", limit.as_secs_f64()),
                    ))
                }),
            None => tool.run(args).await,
        }
    }
}

// ── Path sandboxing ──────────────────────────────────────────

/// Resolve `raw` against `base` and ensure the result stays inside it.
///
/// Absolute paths and paths containing `..` are rejected outright.
pub(crate) fn sandbox_path(base: &Path, raw: &str) -> anyhow::Result<PathBuf> {
    if raw.trim().is_empty() {
        anyhow::bail!("empty path");
    }
    if Path::new(raw).is_absolute() {
        anyhow::bail!("absolute paths are not allowed: {raw}");
    }
    if raw.contains("..") {
        anyhow::bail!("path traversal ('..') is not allowed: {raw}");
    }

    std::fs::create_dir_all(base)
        .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", base.display()))?;
    let base_canon = base
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("canonicalize {} failed: {e}", base.display()))?;
    let resolved = canon_or_resolve(&base.join(raw))?;

    if !resolved.starts_with(&base_canon) {
        anyhow::bail!(
            "path escapes data directory: {} is not under {}",
            resolved.display(),
            base_canon.display()
        );
    }
    Ok(resolved)
}

/// Canonicalize the longest existing prefix of `p` and re-append the rest.
fn canon_or_resolve(p: &Path) -> anyhow::Result<PathBuf> {
    if p.exists() {
        return Ok(p.canonicalize()?);
    }
    let mut existing = p.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        let file = existing
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("cannot resolve path: {}", p.display()))?;
        tail.push(file.to_os_string());
        existing = existing
            .parent()
            .ok_or_else(|| anyhow::anyhow!("cannot resolve path: {}", p.display()))?
            .to_path_buf();
    }
    let mut resolved = existing.canonicalize()?;
    for component in tail.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}
