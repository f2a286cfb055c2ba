//! Grid-side records: regions, their cells, placed containers and edges.
//!
//! # Invariants
//! - A cell belongs to exactly one region.
//! - A container belongs to exactly one region and sits on one `(q, r)`.
//! - Edges never affect item ownership.

use crate::model::{EntityTable, SyncEntity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RegionId = Uuid;
pub type CellId = Uuid;
pub type ContainerId = Uuid;
pub type EdgeId = Uuid;
pub type ProjectId = Uuid;

/// Named group of grid cells inside one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl Region {
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            color: None,
        }
    }
}

impl SyncEntity for Region {
    const TABLE: EntityTable = EntityTable::Regions;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Grid coordinate membership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub region_id: RegionId,
    pub q: i32,
    pub r: i32,
}

impl Cell {
    pub fn new(region_id: RegionId, q: i32, r: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            region_id,
            q,
            r,
        }
    }
}

impl SyncEntity for Cell {
    const TABLE: EntityTable = EntityTable::Cells;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Work-grouping category of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Backlog,
    Sprint,
    Milestone,
    /// Any kind this client does not know yet.
    #[serde(other)]
    Other,
}

/// Placed work-grouping entity that owns items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub region_id: RegionId,
    pub q: i32,
    pub r: i32,
    pub kind: ContainerKind,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl Container {
    pub fn new(
        region_id: RegionId,
        q: i32,
        r: i32,
        kind: ContainerKind,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            region_id,
            q,
            r,
            kind,
            title: title.into(),
            status: None,
            priority: None,
        }
    }
}

impl SyncEntity for Container {
    const TABLE: EntityTable = EntityTable::Containers;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Routing flavor of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Primary,
    Secondary,
}

/// Directed relation between two containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: ContainerId,
    pub target_id: ContainerId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(source_id: ContainerId, target_id: ContainerId, kind: EdgeKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            target_id,
            kind,
        }
    }

    /// Returns whether this edge touches `container_id` on either end.
    pub fn touches(&self, container_id: ContainerId) -> bool {
        self.source_id == container_id || self.target_id == container_id
    }
}

impl SyncEntity for Edge {
    const TABLE: EntityTable = EntityTable::Edges;

    fn id(&self) -> Uuid {
        self.id
    }
}
