//! # agentgw Core
//!
//! Domain types, traits, and error definitions for the agentgw
//! agent-orchestration daemon. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! Every subsystem seam is a trait here: LLM backends implement
//! [`Provider`], agent capabilities implement [`Tool`], conversation
//! persistence implements [`MessageStore`], and the service exposes
//! sub-agent delegation through [`Delegator`]. Implementations live in
//! their respective crates and depend inward on this one.

pub mod delegate;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod skill;
pub mod store;
pub mod tool;

pub use delegate::Delegator;
pub use error::{Error, ProviderError, Result, SkillError, StoreError, ToolError};
pub use event::{AgentEvent, EventBus, EventKind};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, FinishReason, Provider, ProviderRequest,
    ProviderResponse, StreamChunk, ToolDefinition, Usage,
};
pub use session::Session;
pub use skill::{RagContextConfig, Skill, SkillExample};
pub use store::MessageStore;
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult};
