//! Conversation persistence for agentgw.

pub mod sqlite;

pub use sqlite::SqliteStore;
