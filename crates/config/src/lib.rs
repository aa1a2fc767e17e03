//! Configuration loading, validation, and management for stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reasoning backend settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent persona and loop limits
    #[serde(default)]
    pub agent: AgentSettings,

    /// Streaming adapter settings
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Built-in tools and the optional remote tool source
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Which chat-completions backend to talk to.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name ("openai", "openrouter", "ollama", ...)
    #[serde(default = "default_provider")]
    pub name: String,

    /// Base URL override; derived from `name` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            api_url: None,
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// The agent persona: prompts plus loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_agent_description")]
    pub description: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Guidance appended to the system message on every run
    #[serde(default = "default_next_step_prompt")]
    pub next_step_prompt: String,

    /// Appended to the pending input when the agent repeats itself
    #[serde(default = "default_stuck_prompt")]
    pub stuck_prompt: String,

    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// How many earlier identical replies mark the agent as stuck
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: usize,

    /// Re-enumerate a dynamic tool source every N reasoning steps
    #[serde(default = "default_tool_refresh_interval")]
    pub tool_refresh_interval: usize,
}

fn default_agent_name() -> String {
    "stepwise".into()
}
fn default_agent_description() -> String {
    "A general-purpose tool-calling agent".into()
}
fn default_system_prompt() -> String {
    "You are an all-capable AI assistant, aimed at solving any task presented by the user. \
     You have various tools at your disposal that you can call upon to efficiently complete \
     complex requests."
        .into()
}
fn default_next_step_prompt() -> String {
    "Based on user needs, proactively select the most appropriate tool or combination of tools. \
     For complex tasks, break the problem down and use different tools step by step. \
     After using each tool, clearly explain the execution results and suggest the next steps. \
     If you want to stop the interaction at any point, use the `terminate` tool."
        .into()
}
fn default_stuck_prompt() -> String {
    " Observed duplicate responses. Consider new strategies and avoid repeating \
     ineffective paths already attempted."
        .into()
}
fn default_max_steps() -> usize {
    10
}
fn default_duplicate_threshold() -> usize {
    2
}
fn default_tool_refresh_interval() -> usize {
    5
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description: default_agent_description(),
            system_prompt: default_system_prompt(),
            next_step_prompt: default_next_step_prompt(),
            stuck_prompt: default_stuck_prompt(),
            max_steps: default_max_steps(),
            duplicate_threshold: default_duplicate_threshold(),
            tool_refresh_interval: default_tool_refresh_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Wall-clock ceiling for one streamed run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional pacing delay between emitted events
    #[serde(default)]
    pub event_delay_ms: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_timeout_secs() -> u64 {
    300
}
fn default_channel_capacity() -> usize {
    128
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            event_delay_ms: 0,
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub shell_enabled: bool,

    /// First words a shell command may start with; empty allows everything
    #[serde(default = "default_shell_allowlist")]
    pub shell_allowlist: Vec<String>,

    #[serde(default = "default_tool_timeout_secs")]
    pub shell_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub web_fetch_enabled: bool,

    #[serde(default = "default_tool_timeout_secs")]
    pub web_timeout_secs: u64,

    /// Page bodies are cut to this many bytes before reaching the model
    #[serde(default = "default_web_max_bytes")]
    pub web_max_bytes: usize,

    /// Base URL of an HTTP tool catalogue, offered next to the built-ins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_shell_allowlist() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "echo", "pwd", "date", "wc", "grep", "find", "which",
        "git", "cargo",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_web_max_bytes() -> usize {
    64 * 1024
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_enabled: true,
            shell_allowlist: default_shell_allowlist(),
            shell_timeout_secs: default_tool_timeout_secs(),
            web_fetch_enabled: true,
            web_timeout_secs: default_tool_timeout_secs(),
            web_max_bytes: default_web_max_bytes(),
            remote_url: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml).
    ///
    /// Environment overrides:
    /// - `STEPWISE_API_KEY`, then `OPENAI_API_KEY` (only when no key is configured)
    /// - `STEPWISE_PROVIDER`
    /// - `STEPWISE_MODEL`
    /// - `STEPWISE_REMOTE_TOOLS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("STEPWISE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(name) = lookup("STEPWISE_PROVIDER") {
            self.provider.name = name;
        }
        if let Some(model) = lookup("STEPWISE_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("STEPWISE_REMOTE_TOOLS") {
            self.tools.remote_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be > 0".into(),
            ));
        }
        if self.agent.duplicate_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "agent.duplicate_threshold must be > 0".into(),
            ));
        }
        if self.agent.tool_refresh_interval == 0 {
            return Err(ConfigError::ValidationError(
                "agent.tool_refresh_interval must be > 0".into(),
            ));
        }
        if self.streaming.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "streaming.timeout_secs must be > 0".into(),
            ));
        }
        if self.streaming.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "streaming.channel_capacity must be > 0".into(),
            ));
        }
        if self.tools.shell_timeout_secs == 0 || self.tools.web_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools timeouts must be > 0".into(),
            ));
        }
        if self.tools.web_max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "tools.web_max_bytes must be > 0".into(),
            ));
        }
        if let Some(url) = &self.tools.remote_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "tools.remote_url must be an http(s) URL, got '{url}'"
                )));
            }
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
