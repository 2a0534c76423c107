//! Session identity.
//!
//! A session is a durable, ordered conversation bound to exactly one skill
//! for its lifetime. The message log itself lives in the [`crate::store`]
//! implementation; this is the session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session identifier
    pub id: String,

    /// The skill this session is bound to
    pub skill_name: String,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the session last received a message
    pub last_used_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session bound to `skill_name`.
    pub fn create(skill_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            skill_name: skill_name.into(),
            created_at: now,
            last_used_at: now,
        }
    }
}
