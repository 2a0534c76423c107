//! MessageStore trait — append-only conversation persistence.
//!
//! Messages within a session form a totally ordered, append-only log; the
//! service guarantees a single writer per session, so implementations only
//! need per-statement atomicity. Feedback is the one mutable record: one
//! value per assistant message, last write wins.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::Message;
use crate::session::Session;

/// Persistence for sessions, messages, and feedback.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create a session bound to `skill_name`. When `session_id` is given it
    /// is used as-is (client-chosen resume ids); otherwise a fresh id is
    /// generated. Returns the session id.
    async fn create_session(
        &self,
        skill_name: &str,
        session_id: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Fetch a session record.
    async fn session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Append a message to a session's log and touch its `last_used_at`.
    async fn append(&self, session_id: &str, message: &Message) -> Result<(), StoreError>;

    /// The session's full ordered message log.
    async fn history(&self, session_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Recent sessions, optionally filtered by skill, newest first.
    async fn list_sessions(
        &self,
        skill_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError>;

    /// Record feedback for a message. Idempotent; re-submitting replaces the
    /// previous value.
    async fn set_feedback(&self, message_id: &str, value: i64) -> Result<(), StoreError>;

    /// The currently recorded feedback value for a message, if any.
    async fn feedback(&self, message_id: &str) -> Result<Option<i64>, StoreError>;

    /// The id of the most recent assistant message in a session.
    async fn last_assistant_message_id(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, StoreError>;
}
