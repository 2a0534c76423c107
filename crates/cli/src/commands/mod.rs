//! CLI command implementations — thin wrappers over the service object.

pub mod chat;
pub mod ingest;
pub mod route;
pub mod run;
pub mod serve;
pub mod sessions;
pub mod skills;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use agentgw_config::{AppConfig, ConfigError};
use agentgw_service::AgentService;

/// Errors surfaced to the user with distinct exit codes.
#[derive(Debug)]
pub enum CliError {
    Config(String),
    ProviderUnreachable(String),
    Runtime(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{msg}"),
            CliError::ProviderUnreachable(msg) => write!(f, "{msg}"),
            CliError::Runtime(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<agentgw_core::error::Error> for CliError {
    fn from(e: agentgw_core::error::Error) -> Self {
        CliError::Runtime(e.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

/// Load settings from the given path or the default location.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_from(Path::new(path)),
        None => AppConfig::load(),
    }
}

/// Build the service or die with a startup error.
pub async fn build_service(config: AppConfig) -> Result<Arc<AgentService>, CliError> {
    AgentService::new(config)
        .await
        .map_err(|e| CliError::Config(e.to_string()))
}

/// Split a comma-separated flag value.
pub fn split_csv(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
