//! In-memory remote store.
//!
//! Plays the server side for replay tooling and tests: keeps the
//! authoritative records, answers collaborator requests, and records the
//! change-feed messages a real backend would push for every mutation.
//! UPDATE messages carry only the primary key in `old` unless full old
//! values are enabled, matching the default realtime replica identity.

use crate::feed::event::{EventType, FeedMessage};
use crate::feed::ProjectScope;
use crate::model::item::{Item, ItemId};
use crate::model::patch::{merge_patch, to_patch, Patch};
use crate::model::zone::{Cell, Container, ContainerId, Edge, EdgeId, Region, RegionId};
use crate::model::SyncEntity;
use crate::remote::{RemoteError, RemoteResult, RemoteStore};
use crate::store::ScopeSnapshot;
use serde_json::json;
use std::cell::RefCell;
use uuid::Uuid;

/// Request counters, for asserting fetch deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCalls {
    pub fetch_scope: u32,
    pub fetch_cells: u32,
    pub fetch_items: u32,
    pub move_item: u32,
}

#[derive(Debug)]
struct MemoryState {
    records: ScopeSnapshot,
    available: bool,
    reject_moves: bool,
    full_old_values: bool,
    outbox: Vec<FeedMessage>,
    calls: RemoteCalls,
}

/// Authoritative in-process stand-in for the remote project store.
#[derive(Debug)]
pub struct InMemoryRemote {
    scope: ProjectScope,
    state: RefCell<MemoryState>,
}

impl InMemoryRemote {
    pub fn new(scope: ProjectScope) -> Self {
        Self::with_records(scope, ScopeSnapshot::default())
    }

    pub fn with_records(scope: ProjectScope, records: ScopeSnapshot) -> Self {
        Self {
            scope,
            state: RefCell::new(MemoryState {
                records,
                available: true,
                reject_moves: false,
                full_old_values: false,
                outbox: Vec::new(),
                calls: RemoteCalls::default(),
            }),
        }
    }

    /// Simulates network loss for every request.
    pub fn set_available(&self, available: bool) {
        self.state.borrow_mut().available = available;
    }

    /// Makes `move_item` answer with a rejection (`Ok(None)`).
    pub fn set_reject_moves(&self, reject: bool) {
        self.state.borrow_mut().reject_moves = reject;
    }

    /// Includes complete previous records in UPDATE messages.
    pub fn set_full_old_values(&self, enabled: bool) {
        self.state.borrow_mut().full_old_values = enabled;
    }

    pub fn calls(&self) -> RemoteCalls {
        self.state.borrow().calls
    }

    /// Authoritative records as the server sees them.
    pub fn records(&self) -> ScopeSnapshot {
        self.state.borrow().records.clone()
    }

    /// Takes the change-feed messages produced since the last drain.
    pub fn drain_feed(&self) -> Vec<FeedMessage> {
        std::mem::take(&mut self.state.borrow_mut().outbox)
    }

    fn ensure_available(&self) -> RemoteResult<()> {
        if self.state.borrow().available {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("in-memory remote offline".to_string()))
        }
    }

    fn emit<T: SyncEntity>(
        &self,
        state: &mut MemoryState,
        event_type: EventType,
        new: Option<&T>,
        old: Option<&T>,
    ) {
        let old = match (event_type, old) {
            (EventType::Update, Some(previous)) if !state.full_old_values => {
                json!({ "id": previous.id().to_string() }).as_object().cloned()
            }
            (_, previous) => previous.and_then(|record| to_patch(record).ok()),
        };
        state.outbox.push(FeedMessage::new(
            T::TABLE,
            event_type,
            &self.scope,
            new.and_then(|record| to_patch(record).ok()),
            old,
        ));
    }

    fn remove_container_records(
        &self,
        state: &mut MemoryState,
        container_id: ContainerId,
    ) -> bool {
        let Some(index) = state
            .records
            .containers
            .iter()
            .position(|container| container.id == container_id)
        else {
            return false;
        };
        let container = state.records.containers.remove(index);
        let (gone_items, kept_items): (Vec<Item>, Vec<Item>) =
            std::mem::take(&mut state.records.items)
                .into_iter()
                .partition(|item| item.container_id == container_id);
        state.records.items = kept_items;
        let (gone_edges, kept_edges): (Vec<Edge>, Vec<Edge>) =
            std::mem::take(&mut state.records.edges)
                .into_iter()
                .partition(|edge| edge.touches(container_id));
        state.records.edges = kept_edges;

        for item in &gone_items {
            self.emit(state, EventType::Delete, None, Some(item));
        }
        for edge in &gone_edges {
            self.emit(state, EventType::Delete, None, Some(edge));
        }
        self.emit(state, EventType::Delete, None, Some(&container));
        true
    }
}

fn rejected(err: impl std::fmt::Display) -> RemoteError {
    RemoteError::Rejected(err.to_string())
}

fn find_mut<T: SyncEntity>(records: &mut [T], id: Uuid) -> RemoteResult<&mut T> {
    records
        .iter_mut()
        .find(|record| record.id() == id)
        .ok_or(RemoteError::NotFound(id))
}

impl RemoteStore for InMemoryRemote {
    fn fetch_scope(&self, scope: &ProjectScope) -> RemoteResult<ScopeSnapshot> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        state.calls.fetch_scope += 1;
        if *scope != self.scope {
            return Ok(ScopeSnapshot::default());
        }
        Ok(state.records.clone())
    }

    fn fetch_cells(&self, region_id: RegionId) -> RemoteResult<Vec<Cell>> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        state.calls.fetch_cells += 1;
        Ok(state
            .records
            .cells
            .iter()
            .filter(|cell| cell.region_id == region_id)
            .cloned()
            .collect())
    }

    fn fetch_items(&self, container_id: ContainerId) -> RemoteResult<Vec<Item>> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        state.calls.fetch_items += 1;
        Ok(state
            .records
            .items
            .iter()
            .filter(|item| item.container_id == container_id)
            .cloned()
            .collect())
    }

    fn create_region(&self, region: &Region, cells: &[Cell]) -> RemoteResult<Region> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        let mut created = region.clone();
        created.project_id = self.scope.project_id;
        state.records.regions.push(created.clone());
        self.emit(&mut state, EventType::Insert, Some(&created), None);
        for cell in cells {
            let mut cell = cell.clone();
            cell.region_id = created.id;
            state.records.cells.push(cell.clone());
            self.emit(&mut state, EventType::Insert, Some(&cell), None);
        }
        Ok(created)
    }

    fn update_region(&self, region_id: RegionId, patch: &Patch) -> RemoteResult<Region> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        let slot = find_mut(&mut state.records.regions, region_id)?;
        let previous = slot.clone();
        *slot = merge_patch(&previous, patch).map_err(rejected)?;
        let updated = slot.clone();
        self.emit(&mut state, EventType::Update, Some(&updated), Some(&previous));
        Ok(updated)
    }

    fn delete_region(&self, region_id: RegionId) -> RemoteResult<bool> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        let Some(index) = state
            .records
            .regions
            .iter()
            .position(|region| region.id == region_id)
        else {
            return Ok(false);
        };
        let region = state.records.regions.remove(index);
        let owned: Vec<ContainerId> = state
            .records
            .containers
            .iter()
            .filter(|container| container.region_id == region_id)
            .map(|container| container.id)
            .collect();
        for container_id in owned {
            self.remove_container_records(&mut state, container_id);
        }
        let (gone_cells, kept_cells): (Vec<Cell>, Vec<Cell>) =
            std::mem::take(&mut state.records.cells)
                .into_iter()
                .partition(|cell| cell.region_id == region_id);
        state.records.cells = kept_cells;
        for cell in &gone_cells {
            self.emit(&mut state, EventType::Delete, None, Some(cell));
        }
        self.emit(&mut state, EventType::Delete, None, Some(&region));
        Ok(true)
    }

    fn create_container(&self, container: &Container) -> RemoteResult<Container> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        if !state
            .records
            .regions
            .iter()
            .any(|region| region.id == container.region_id)
        {
            return Err(RemoteError::NotFound(container.region_id));
        }
        state.records.containers.push(container.clone());
        self.emit(&mut state, EventType::Insert, Some(container), None);
        Ok(container.clone())
    }

    fn update_container(
        &self,
        container_id: ContainerId,
        patch: &Patch,
    ) -> RemoteResult<Container> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        let slot = find_mut(&mut state.records.containers, container_id)?;
        let previous = slot.clone();
        *slot = merge_patch(&previous, patch).map_err(rejected)?;
        let updated = slot.clone();
        self.emit(&mut state, EventType::Update, Some(&updated), Some(&previous));
        Ok(updated)
    }

    fn delete_container(&self, container_id: ContainerId) -> RemoteResult<bool> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        Ok(self.remove_container_records(&mut state, container_id))
    }

    fn create_item(&self, container_id: ContainerId, fields: &Patch) -> RemoteResult<Item> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        if !state
            .records
            .containers
            .iter()
            .any(|container| container.id == container_id)
        {
            return Err(RemoteError::NotFound(container_id));
        }
        let mut item =
            merge_patch(&Item::new(container_id, "Untitled"), fields).map_err(rejected)?;
        item.container_id = container_id;
        state.records.items.push(item.clone());
        self.emit(&mut state, EventType::Insert, Some(&item), None);
        Ok(item)
    }

    fn update_item(&self, item_id: ItemId, patch: &Patch) -> RemoteResult<Item> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        let slot = find_mut(&mut state.records.items, item_id)?;
        let previous = slot.clone();
        *slot = merge_patch(&previous, patch).map_err(rejected)?;
        let updated = slot.clone();
        self.emit(&mut state, EventType::Update, Some(&updated), Some(&previous));
        Ok(updated)
    }

    fn move_item(&self, item_id: ItemId, to: ContainerId) -> RemoteResult<Option<Item>> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        state.calls.move_item += 1;
        if state.reject_moves
            || !state
                .records
                .containers
                .iter()
                .any(|container| container.id == to)
        {
            return Ok(None);
        }
        let Ok(slot) = find_mut(&mut state.records.items, item_id) else {
            return Ok(None);
        };
        let previous = slot.clone();
        slot.container_id = to;
        let moved = slot.clone();
        self.emit(&mut state, EventType::Update, Some(&moved), Some(&previous));
        Ok(Some(moved))
    }

    fn delete_item(&self, item_id: ItemId) -> RemoteResult<bool> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        let Some(index) = state.records.items.iter().position(|item| item.id == item_id) else {
            return Ok(false);
        };
        let item = state.records.items.remove(index);
        self.emit(&mut state, EventType::Delete, None, Some(&item));
        Ok(true)
    }

    fn create_edge(&self, edge: &Edge) -> RemoteResult<Edge> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        state.records.edges.push(edge.clone());
        self.emit(&mut state, EventType::Insert, Some(edge), None);
        Ok(edge.clone())
    }

    fn delete_edge(&self, edge_id: EdgeId) -> RemoteResult<bool> {
        self.ensure_available()?;
        let mut state = self.state.borrow_mut();
        let Some(index) = state.records.edges.iter().position(|edge| edge.id == edge_id) else {
            return Ok(false);
        };
        let edge = state.records.edges.remove(index);
        self.emit(&mut state, EventType::Delete, None, Some(&edge));
        Ok(true)
    }
}
