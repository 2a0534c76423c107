//! Provider router — builds and selects LLM providers from configuration.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use agentgw_config::AppConfig;
use agentgw_core::error::Error;
use agentgw_core::provider::Provider;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Holds the configured providers and knows which one is the default.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider under a name.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// The configured default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// A specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    /// Build the router from configuration. The configured default provider
    /// must be buildable or startup fails.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let mut router = Self::new(&config.llm.provider);

        if let Some(key) = &config.openai_api_key {
            router.register("openai", Arc::new(OpenAiCompatProvider::openai(key)));
        }
        if let Some(key) = &config.anthropic_api_key {
            router.register("anthropic", Arc::new(AnthropicProvider::new(key)));
        }
        if let Some(key) = &config.xai_api_key {
            router.register("xai", Arc::new(OpenAiCompatProvider::xai(key)));
        }

        if router.default_provider().is_none() {
            return Err(Error::Config {
                message: format!(
                    "No API key configured for llm.provider '{}' — set {}",
                    config.llm.provider,
                    match config.llm.provider.as_str() {
                        "openai" => "OPENAI_API_KEY",
                        "anthropic" => "ANTHROPIC_API_KEY",
                        "xai" => "XAI_API_KEY",
                        _ => "the provider's API key",
                    }
                ),
            });
        }

        info!(
            default = %config.llm.provider,
            registered = ?router.list(),
            "Provider router built"
        );
        Ok(router)
    }
}
