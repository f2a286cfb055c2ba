//! Ephemeral presence record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ParticipantId = Uuid;
pub type SessionId = String;

/// Presence entry for one participant in one session (room).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub session_id: SessionId,
    /// Unix epoch milliseconds of the last heartbeat.
    pub last_seen_ms: i64,
}

impl Participant {
    pub fn new(id: ParticipantId, session_id: impl Into<SessionId>, last_seen_ms: i64) -> Self {
        Self {
            id,
            session_id: session_id.into(),
            last_seen_ms,
        }
    }
}
