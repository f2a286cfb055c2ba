//! Collaborator contracts consumed by the synchronization core.
//!
//! # Responsibility
//! - Describe the request/response operations of the remote store whose
//!   results the core reconciles.
//!
//! # Invariants
//! - The remote store is the authority for final field values.
//! - `move_item` reports rejection as `Ok(None)`, transport failure as `Err`.

pub mod memory;

use crate::feed::ProjectScope;
use crate::model::item::{Item, ItemId};
use crate::model::patch::Patch;
use crate::model::zone::{Cell, Container, ContainerId, Edge, EdgeId, Region, RegionId};
use crate::store::ScopeSnapshot;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote request failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or service unavailable.
    Unavailable(String),
    NotFound(Uuid),
    /// Request was understood and refused.
    Rejected(String),
    InvalidResponse(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "remote unavailable: {message}"),
            Self::NotFound(id) => write!(f, "remote record not found: {id}"),
            Self::Rejected(message) => write!(f, "remote rejected request: {message}"),
            Self::InvalidResponse(message) => write!(f, "invalid remote response: {message}"),
        }
    }
}

impl Error for RemoteError {}

/// Request/response operations of the remote project store.
pub trait RemoteStore {
    /// Bulk fetch of every record in scope.
    fn fetch_scope(&self, scope: &ProjectScope) -> RemoteResult<ScopeSnapshot>;
    fn fetch_cells(&self, region_id: RegionId) -> RemoteResult<Vec<Cell>>;
    fn fetch_items(&self, container_id: ContainerId) -> RemoteResult<Vec<Item>>;

    fn create_region(&self, region: &Region, cells: &[Cell]) -> RemoteResult<Region>;
    fn update_region(&self, region_id: RegionId, patch: &Patch) -> RemoteResult<Region>;
    fn delete_region(&self, region_id: RegionId) -> RemoteResult<bool>;

    fn create_container(&self, container: &Container) -> RemoteResult<Container>;
    fn update_container(&self, container_id: ContainerId, patch: &Patch)
        -> RemoteResult<Container>;
    fn delete_container(&self, container_id: ContainerId) -> RemoteResult<bool>;

    fn create_item(&self, container_id: ContainerId, fields: &Patch) -> RemoteResult<Item>;
    fn update_item(&self, item_id: ItemId, patch: &Patch) -> RemoteResult<Item>;
    fn move_item(&self, item_id: ItemId, to: ContainerId) -> RemoteResult<Option<Item>>;
    fn delete_item(&self, item_id: ItemId) -> RemoteResult<bool>;

    fn create_edge(&self, edge: &Edge) -> RemoteResult<Edge>;
    fn delete_edge(&self, edge_id: EdgeId) -> RemoteResult<bool>;
}
