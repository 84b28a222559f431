use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Longest snapshot interval accepted for `activity.slice_seconds`.
pub const MAX_SLICE_SECONDS: u64 = 86_400;

/// Top-level configuration loaded from `config.yaml`.
///
/// Every section is optional in the file and falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Completion provider settings.
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub storage: StorageConfig,
    pub activity: ActivityConfig,
    pub logging: LoggingConfig,
}

/// The configured LLM provider.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Provider kind: "openai" or "stub".
    pub provider: String,
    /// Model name to request (e.g. "gpt-4").
    pub model: String,
    /// Chat-completions URL; the OpenAI endpoint when unset.
    pub endpoint: Option<String>,
    /// API key (plain text or env-var reference like `$OPENAI_API_KEY`).
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Attempts per completion request.  `1` disables retry.
    pub max_retries: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4".into(),
            endpoint: None,
            api_key: Some("$OPENAI_API_KEY".into()),
            temperature: 0.7,
            max_tokens: Some(1000),
            max_retries: 1,
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub name: String,
    /// Placed at the head of every new conversation when set.
    pub system_prompt: Option<String>,
    /// Per-tool execution limit.
    pub tool_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "AIDeck Agent".into(),
            system_prompt: None,
            tool_timeout_secs: 30,
        }
    }
}

/// Conversation storage.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database file; `:memory:` for a throwaway store.
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "aideck.db".into(),
        }
    }
}

/// Activity tracking.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivityConfig {
    /// Seconds one activity snapshot stands for.
    pub slice_seconds: u64,
    /// Directory activity logs are saved to and loaded from.
    pub data_dir: String,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            slice_seconds: crate::activity::summary::DEFAULT_SLICE_SECONDS,
            data_dir: "activity".into(),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Optional JSON-lines log file.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

impl Config {
    /// Read and parse a YAML configuration file, resolving relative
    /// paths against [`crate::aideck_home`].
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        Self::load_with_home(path, &crate::aideck_home()).await
    }

    /// Like [`load`](Self::load) with an explicit home directory.
    ///
    /// A missing file falls back to `<path>.bak`, then to the defaults.
    pub async fn load_with_home(path: &Path, home: &Path) -> anyhow::Result<Config> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => Some(c),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let bak_path = bak_path(path);
                match tokio::fs::read_to_string(&bak_path).await {
                    Ok(c) => {
                        tracing::warn!(
                            path = %path.display(),
                            bak = %bak_path.display(),
                            "config file not found, falling back to .bak"
                        );
                        Some(c)
                    }
                    Err(_) => {
                        tracing::warn!(
                            path = %path.display(),
                            "config file not found, using defaults"
                        );
                        None
                    }
                }
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        let mut config: Config = match contents {
            Some(c) => serde_yaml::from_str(&c).context("failed to parse config YAML")?,
            None => Config::default(),
        };
        config.validate()?;
        config.resolve_paths(home);

        tracing::debug!(
            provider = %config.model.provider,
            model = %config.model.model,
            database = %config.storage.database,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.activity.slice_seconds == 0 {
            anyhow::bail!("config: activity.slice_seconds must be greater than 0");
        }
        if self.activity.slice_seconds > MAX_SLICE_SECONDS {
            anyhow::bail!(
                "config: activity.slice_seconds {} exceeds one day ({MAX_SLICE_SECONDS})",
                self.activity.slice_seconds
            );
        }
        if self.agent.tool_timeout_secs == 0 {
            anyhow::bail!("config: agent.tool_timeout_secs must be greater than 0");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            anyhow::bail!(
                "config: model.temperature {} is outside [0, 2]",
                self.model.temperature
            );
        }
        if self.model.max_retries == 0 {
            anyhow::bail!("config: model.max_retries must be at least 1");
        }
        if self.model.model.trim().is_empty() {
            anyhow::bail!("config: model.model is empty");
        }
        Ok(())
    }

    /// Make relative storage, activity and log paths absolute under `home`.
    pub fn resolve_paths(&mut self, home: &Path) {
        if self.storage.database != ":memory:" {
            self.storage.database = resolve(home, &self.storage.database);
        }
        self.activity.data_dir = resolve(home, &self.activity.data_dir);
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(resolve(home, file));
        }
    }

    pub fn tool_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.agent.tool_timeout_secs)
    }

    /// Serialize and write the configuration back to a YAML file.
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_yaml::to_string(self).context("serialize config YAML")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, &contents)
            .await
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

fn bak_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

fn resolve(home: &Path, raw: &str) -> String {
    let p = Path::new(raw);
    if p.is_relative() {
        home.join(p).to_string_lossy().to_string()
    } else {
        raw.to_string()
    }
}
