//! Work item record.
//!
//! # Invariants
//! - `container_id` is the single owning container.
//! - Nested collections are replaced wholesale by patches, never merged
//!   element-wise.

use crate::model::zone::ContainerId;
use crate::model::{EntityTable, SyncEntity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type ItemId = Uuid;

/// Unit of work placed inside one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub container_id: ContainerId,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form checklist entries.
    #[serde(default)]
    pub checklist: Vec<Value>,
    #[serde(default)]
    pub links: Vec<Value>,
    #[serde(default)]
    pub comments: Vec<Value>,
}

impl Item {
    pub fn new(container_id: ContainerId, title: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), container_id, title)
    }

    /// Used by fetch/import paths where the id already exists remotely.
    pub fn with_id(id: ItemId, container_id: ContainerId, title: impl Into<String>) -> Self {
        Self {
            id,
            container_id,
            title: title.into(),
            status: None,
            priority: None,
            description: None,
            checklist: Vec::new(),
            links: Vec::new(),
            comments: Vec::new(),
        }
    }
}

impl SyncEntity for Item {
    const TABLE: EntityTable = EntityTable::Items;

    fn id(&self) -> Uuid {
        self.id
    }
}
