//! Server-pushed change feed: message schema, transport seam, subscriber.
//!
//! # Responsibility
//! - Decode raw row-level change notifications into typed table changes.
//! - Own the channel lifecycle per project scope and its health signal.
//!
//! # Invariants
//! - Nothing is dispatched for a handle after it was unsubscribed or
//!   replaced.
//! - Messages for another scope never reach the reconciler.

pub mod event;
pub mod subscriber;
pub mod transport;

use crate::model::zone::ProjectId;
use serde::{Deserialize, Serialize};

/// Project scope a channel is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectScope {
    pub project_id: ProjectId,
}

impl ProjectScope {
    pub fn new(project_id: ProjectId) -> Self {
        Self { project_id }
    }

    /// Channel topic name used by the transport.
    pub fn channel_name(&self) -> String {
        format!("project:{}", self.project_id)
    }
}
