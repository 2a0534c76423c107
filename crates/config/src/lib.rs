//! Configuration loading, validation, and management for agentgw.
//!
//! Settings come from a TOML file (default `config/settings.toml`) with
//! environment variable overrides in the `AGENTGW_<SECTION>__<KEY>` form —
//! double underscore is the nesting separator, e.g. `AGENTGW_LLM__MODEL` or
//! `AGENTGW_AGENT__MAX_ORCHESTRATION_DEPTH`. Provider API keys come from
//! their conventional flat variables. Configuration is immutable after load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider selection and defaults
    #[serde(default)]
    pub llm: LlmConfig,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// On-disk paths
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway bind settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Webhook delivery settings
    #[serde(default)]
    pub webhooks: WebhooksConfig,

    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Directory of skill definition files
    #[serde(default = "default_skills_dir")]
    pub skills_dir: String,

    /// API key protecting `/api/*` routes. None = open access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-provider API keys (usually supplied via environment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xai_api_key: Option<String>,
}

fn default_skills_dir() -> String {
    "skills".into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("llm", &self.llm)
            .field("agent", &self.agent)
            .field("storage", &self.storage)
            .field("gateway", &self.gateway)
            .field("webhooks", &self.webhooks)
            .field("scheduler", &self.scheduler)
            .field("skills_dir", &self.skills_dir)
            .field("api_key", &redact(&self.api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("xai_api_key", &redact(&self.xai_api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// One of "openai", "anthropic", "xai"
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Embedding model for retrieval. None = deterministic local embedder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            embedding_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_max_depth")]
    pub max_orchestration_depth: usize,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_depth() -> usize {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_orchestration_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Snapshot file for the embedded vector index
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Directory for scheduled-job output logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_sqlite_path() -> String {
    "data/agentgw.db".into()
}
fn default_index_path() -> String {
    "data/index.json".into()
}
fn default_log_dir() -> String {
    "data/logs".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            index_path: default_index_path(),
            log_dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    /// Total delivery attempts per event per subscription
    #[serde(default = "default_webhook_retries")]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,

    /// YAML file declaring subscriptions
    #[serde(default = "default_webhooks_path")]
    pub config_path: String,
}

fn default_webhook_retries() -> u32 {
    3
}
fn default_webhook_timeout() -> u64 {
    30
}
fn default_webhooks_path() -> String {
    "config/webhooks.yaml".into()
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            max_retries: default_webhook_retries(),
            timeout_secs: default_webhook_timeout(),
            config_path: default_webhooks_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// YAML file declaring scheduled jobs
    #[serde(default = "default_jobs_path")]
    pub config_path: String,
}

fn default_true() -> bool {
    true
}
fn default_jobs_path() -> String {
    "config/scheduled_jobs.yaml".into()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            config_path: default_jobs_path(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
            storage: StorageConfig::default(),
            gateway: GatewayConfig::default(),
            webhooks: WebhooksConfig::default(),
            scheduler: SchedulerConfig::default(),
            skills_dir: default_skills_dir(),
            api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            xai_api_key: None,
        }
    }
}

impl AppConfig {
    /// Load from the default location with environment overrides applied.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("config/settings.toml"))
    }

    /// Load from a specific file, then overlay the environment. A missing
    /// file is not an error — defaults apply.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            tracing::info!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides(&env_snapshot());
        config.validate()?;
        Ok(config)
    }

    /// Overlay `AGENTGW_<SECTION>__<KEY>` variables plus the flat API keys.
    ///
    /// Takes the environment as a list so tests can exercise overrides
    /// without mutating the process environment.
    pub fn apply_env_overrides(&mut self, vars: &[(String, String)]) {
        for (key, value) in vars {
            match key.as_str() {
                "AGENTGW_API_KEY" => self.api_key = Some(value.clone()),
                "OPENAI_API_KEY" => self.openai_api_key = Some(value.clone()),
                "ANTHROPIC_API_KEY" => self.anthropic_api_key = Some(value.clone()),
                "XAI_API_KEY" => self.xai_api_key = Some(value.clone()),
                "AGENTGW_SKILLS_DIR" => self.skills_dir = value.clone(),
                _ => {
                    let Some(rest) = key.strip_prefix("AGENTGW_") else {
                        continue;
                    };
                    let Some((section, field)) = rest.split_once("__") else {
                        continue;
                    };
                    self.set_nested(&section.to_lowercase(), &field.to_lowercase(), value);
                }
            }
        }
    }

    fn set_nested(&mut self, section: &str, field: &str, value: &str) {
        let applied = match (section, field) {
            ("llm", "provider") => {
                self.llm.provider = value.to_string();
                true
            }
            ("llm", "model") => {
                self.llm.model = value.to_string();
                true
            }
            ("llm", "temperature") => set_parsed(&mut self.llm.temperature, value),
            ("llm", "max_tokens") => set_parsed(&mut self.llm.max_tokens, value),
            ("llm", "embedding_model") => {
                self.llm.embedding_model = Some(value.to_string());
                true
            }
            ("agent", "max_iterations") => set_parsed(&mut self.agent.max_iterations, value),
            ("agent", "max_orchestration_depth") => {
                set_parsed(&mut self.agent.max_orchestration_depth, value)
            }
            ("storage", "sqlite_path") => {
                self.storage.sqlite_path = value.to_string();
                true
            }
            ("storage", "index_path") => {
                self.storage.index_path = value.to_string();
                true
            }
            ("storage", "log_dir") => {
                self.storage.log_dir = value.to_string();
                true
            }
            ("gateway", "host") => {
                self.gateway.host = value.to_string();
                true
            }
            ("gateway", "port") => set_parsed(&mut self.gateway.port, value),
            ("webhooks", "max_retries") => set_parsed(&mut self.webhooks.max_retries, value),
            ("webhooks", "timeout_secs") => set_parsed(&mut self.webhooks.timeout_secs, value),
            ("webhooks", "config_path") => {
                self.webhooks.config_path = value.to_string();
                true
            }
            ("scheduler", "enabled") => set_parsed(&mut self.scheduler.enabled, value),
            ("scheduler", "config_path") => {
                self.scheduler.config_path = value.to_string();
                true
            }
            _ => false,
        };

        if !applied {
            tracing::warn!(section, field, "Ignoring unrecognized config override");
        }
    }

    /// The API key for the configured default provider, if set.
    pub fn provider_api_key(&self) -> Option<&str> {
        match self.llm.provider.as_str() {
            "openai" => self.openai_api_key.as_deref(),
            "anthropic" => self.anthropic_api_key.as_deref(),
            "xai" => self.xai_api_key.as_deref(),
            _ => None,
        }
    }

    /// Validate loaded settings. Fatal at startup on failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be positive".into(),
            ));
        }
        match self.llm.provider.as_str() {
            "openai" | "anthropic" | "xai" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown llm.provider '{other}' (expected openai, anthropic, or xai)"
                )));
            }
        }
        Ok(())
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

fn env_snapshot() -> Vec<(String, String)> {
    std::env::vars().collect()
}

/// Configuration errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
