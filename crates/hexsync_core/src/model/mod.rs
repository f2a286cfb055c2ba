//! Entity model for the synchronized project scope.
//!
//! # Responsibility
//! - Define the records mirrored from the remote store (regions, cells,
//!   containers, items, edges) and ephemeral participants.
//! - Provide shallow-merge patch semantics shared by every entity table.
//!
//! # Invariants
//! - Every synchronized record is identified by a stable `Uuid` that never
//!   changes across updates.
//! - An item is owned by exactly one container at a time.

pub mod item;
pub mod participant;
pub mod patch;
pub mod zone;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Remote table a synchronized record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
    Regions,
    Cells,
    Containers,
    Items,
    Edges,
}

impl EntityTable {
    /// Stable wire name used by the change feed.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regions => "regions",
            Self::Cells => "cells",
            Self::Containers => "containers",
            Self::Items => "items",
            Self::Edges => "edges",
        }
    }

    /// Parses a feed table name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "regions" => Some(Self::Regions),
            "cells" => Some(Self::Cells),
            "containers" => Some(Self::Containers),
            "items" => Some(Self::Items),
            "edges" => Some(Self::Edges),
            _ => None,
        }
    }
}

impl Display for EntityTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common contract for records kept in the canonical store.
pub trait SyncEntity: Clone + Serialize + DeserializeOwned {
    const TABLE: EntityTable;

    fn id(&self) -> Uuid;
}
