//! Built-in tool implementations for agentgw.
//!
//! Tools are what let a skill act: search and grow the knowledge base, and
//! delegate sub-tasks to other skills. Everything else (shell, file I/O,
//! web) belongs to external integrations, not the daemon core.

pub mod delegate;
pub mod knowledge_ingest;
pub mod knowledge_query;

use std::sync::{Arc, Weak};

use agentgw_core::delegate::Delegator;
use agentgw_core::tool::ToolRegistry;
use agentgw_rag::VectorStore;

pub use delegate::DelegateTool;
pub use knowledge_ingest::KnowledgeIngestTool;
pub use knowledge_query::KnowledgeQueryTool;

/// Create the registry of built-in tools.
///
/// `delegator` is weak because the service that implements it also owns the
/// registry; the tool upgrades on each call.
pub fn builtin_registry(rag: Arc<VectorStore>, delegator: Weak<dyn Delegator>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(KnowledgeQueryTool::new(rag.clone())));
    registry.register(Box::new(KnowledgeIngestTool::new(rag)));
    registry.register(Box::new(DelegateTool::new(delegator)));
    registry
}
