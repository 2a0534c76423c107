//! LLM provider implementations for agentgw.
//!
//! All providers implement `agentgw_core::Provider`. OpenAI and xAI share
//! the OpenAI-compatible wire format; Anthropic uses its native Messages
//! API. The router selects the provider named by configuration.

pub mod anthropic;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::ProviderRouter;
