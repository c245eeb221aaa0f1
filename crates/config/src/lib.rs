//! Configuration loading, validation, and management for Hearth.
//!
//! Loads configuration from `~/.hearth/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.hearth/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Persona configuration
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Planner tuning
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Background worker settings
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Where conversations, memories and tool state live
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.1:8b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("identity", &self.identity)
            .field("planner", &self.planner)
            .field("workers", &self.workers)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// The assistant's name, used in the persona prompt
    #[serde(default = "default_identity_name")]
    pub name: String,

    /// Base persona prompt; the planner appends memories and the tool catalog
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_identity_name() -> String {
    "Hearth".into()
}
fn default_system_prompt() -> String {
    "You are Hearth, a warm and concise personal assistant. \
     Answer plainly, remember what the user tells you about themselves, \
     and use tools when they help."
        .into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_identity_name(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Recent conversation messages included in the prompt
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Memory excerpts included in the prompt
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,

    /// Process messages of one conversation one at a time
    #[serde(default = "default_true")]
    pub serialize_conversations: bool,
}

fn default_history_limit() -> usize {
    12
}
fn default_memory_limit() -> usize {
    8
}
fn default_true() -> bool {
    true
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            memory_limit: default_memory_limit(),
            serialize_conversations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Cap on simultaneously running jobs (unset = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_jobs: Option<usize>,

    /// Messages accumulated since the last compaction before another runs
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,

    /// Most recent messages left out of a compaction summary
    #[serde(default = "default_compaction_keep_recent")]
    pub compaction_keep_recent: usize,
}

fn default_compaction_threshold() -> usize {
    40
}
fn default_compaction_keep_recent() -> usize {
    10
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: None,
            compaction_threshold: default_compaction_threshold(),
            compaction_keep_recent: default_compaction_keep_recent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory", "file" or "sqlite"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// SQLite database path (sqlite backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// JSONL tool-state file (file backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_state_path: Option<String>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
            tool_state_path: None,
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("hearth.db"))
    }

    pub fn tool_state_file(&self) -> PathBuf {
        self.tool_state_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("tools.jsonl"))
    }
}

const STORAGE_BACKENDS: [&str; 3] = ["memory", "file", "sqlite"];

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

impl AppConfig {
    /// Load configuration from the default path (~/.hearth/config.toml).
    ///
    /// Environment overrides:
    /// - `HEARTH_API_KEY`
    /// - `HEARTH_PROVIDER`
    /// - `HEARTH_MODEL`
    /// - `HEARTH_BASE_URL` (applies to the default provider)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("HEARTH_API_KEY");
        }
        if let Some(provider) = lookup("HEARTH_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("HEARTH_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = lookup("HEARTH_BASE_URL") {
            self.providers
                .entry(self.default_provider.clone())
                .or_default()
                .api_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hearth")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.planner.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "planner.history_limit must be > 0".into(),
            ));
        }

        if self.workers.compaction_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "workers.compaction_threshold must be > 0".into(),
            ));
        }

        if self.workers.max_concurrent_jobs == Some(0) {
            return Err(ConfigError::ValidationError(
                "workers.max_concurrent_jobs must be > 0 when set".into(),
            ));
        }

        if !STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "storage.backend must be one of {:?}, got '{}'",
                STORAGE_BACKENDS, self.storage.backend
            )));
        }

        Ok(())
    }

    /// Settings for the default provider, if configured.
    pub fn default_provider_config(&self) -> Option<&ProviderConfig> {
        self.providers.get(&self.default_provider)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            identity: IdentityConfig::default(),
            planner: PlannerConfig::default(),
            workers: WorkersConfig::default(),
            storage: StorageConfig::default(),
        }
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
