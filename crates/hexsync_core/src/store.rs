//! Canonical in-memory store for one project scope.
//!
//! # Responsibility
//! - Hold the keyed collections the UI reads (regions, cells, containers,
//!   per-container item lists, edges).
//! - Provide structural primitives (prepend, replace, cascade delete) used by
//!   the reconciler and the move coordinator.
//!
//! # Invariants
//! - An item id appears in at most one container list.
//! - Item lists are never stored empty, so two stores holding the same
//!   records compare equal regardless of their mutation history.
//! - Removing a region removes its cells and containers; removing a container
//!   removes its items and every edge touching it.
//! - Mutators are crate-private: only reconciliation and move coordination
//!   write here.

use crate::model::item::{Item, ItemId};
use crate::model::zone::{
    Cell, CellId, Container, ContainerId, Edge, EdgeId, ProjectId, Region, RegionId,
};
use crate::model::{EntityTable, SyncEntity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Bulk form of one project scope, as fetched on full reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Records dropped by one cascading removal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removal {
    pub regions: Vec<RegionId>,
    pub cells: Vec<CellId>,
    pub containers: Vec<ContainerId>,
    pub items: Vec<ItemId>,
    pub edges: Vec<EdgeId>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
            && self.cells.is_empty()
            && self.containers.is_empty()
            && self.items.is_empty()
            && self.edges.is_empty()
    }

    fn absorb(&mut self, other: Removal) {
        self.regions.extend(other.regions);
        self.cells.extend(other.cells);
        self.containers.extend(other.containers);
        self.items.extend(other.items);
        self.edges.extend(other.edges);
    }
}

/// Single source of truth the UI reads for one project.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalStore {
    project_id: ProjectId,
    regions: Vec<Region>,
    cells: Vec<Cell>,
    containers: Vec<Container>,
    items: BTreeMap<ContainerId, Vec<Item>>,
    edges: Vec<Edge>,
}

impl CanonicalStore {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            regions: Vec::new(),
            cells: Vec::new(),
            containers: Vec::new(),
            items: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|region| region.id == id)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_in(&self, region_id: RegionId) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(move |cell| cell.region_id == region_id)
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.containers.iter().find(|container| container.id == id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the item list of one container (empty when none).
    pub fn items_in(&self, container_id: ContainerId) -> &[Item] {
        self.items
            .get(&container_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterates every non-empty item list keyed by container id.
    pub fn item_lists(&self) -> impl Iterator<Item = (ContainerId, &[Item])> {
        self.items
            .iter()
            .map(|(container_id, items)| (*container_id, items.as_slice()))
    }

    /// Finds one item anywhere in the store.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.values().flatten().find(|item| item.id == id)
    }

    /// Returns the container whose list holds `item_id`, scanning every list.
    pub fn locate_item(&self, item_id: ItemId) -> Option<ContainerId> {
        self.items
            .iter()
            .find(|(_, list)| list.iter().any(|item| item.id == item_id))
            .map(|(container_id, _)| *container_id)
    }

    pub fn item_count(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    /// Returns whether a record with `id` exists in `table`.
    pub fn contains(&self, table: EntityTable, id: Uuid) -> bool {
        match table {
            EntityTable::Regions => self.region(id).is_some(),
            EntityTable::Cells => self.cells.iter().any(|cell| cell.id == id),
            EntityTable::Containers => self.container(id).is_some(),
            EntityTable::Items => self.item(id).is_some(),
            EntityTable::Edges => self.edges.iter().any(|edge| edge.id == id),
        }
    }

    /// Returns whether `container_id`'s list currently holds `item_id`.
    pub fn container_holds(&self, container_id: ContainerId, item_id: ItemId) -> bool {
        self.items_in(container_id)
            .iter()
            .any(|item| item.id == item_id)
    }

    /// Exports the current contents in bulk form.
    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            regions: self.regions.clone(),
            cells: self.cells.clone(),
            containers: self.containers.clone(),
            items: self.items.values().flatten().cloned().collect(),
            edges: self.edges.clone(),
        }
    }

    pub(crate) fn insert_region(&mut self, region: Region) -> bool {
        prepend_if_absent(&mut self.regions, region)
    }

    pub(crate) fn replace_region(&mut self, region: Region) -> bool {
        replace_by_id(&mut self.regions, region)
    }

    pub(crate) fn insert_cell(&mut self, cell: Cell) -> bool {
        prepend_if_absent(&mut self.cells, cell)
    }

    pub(crate) fn replace_cell(&mut self, cell: Cell) -> bool {
        replace_by_id(&mut self.cells, cell)
    }

    pub(crate) fn insert_container(&mut self, container: Container) -> bool {
        prepend_if_absent(&mut self.containers, container)
    }

    pub(crate) fn replace_container(&mut self, container: Container) -> bool {
        replace_by_id(&mut self.containers, container)
    }

    pub(crate) fn insert_edge(&mut self, edge: Edge) -> bool {
        prepend_if_absent(&mut self.edges, edge)
    }

    pub(crate) fn replace_edge(&mut self, edge: Edge) -> bool {
        replace_by_id(&mut self.edges, edge)
    }

    /// Prepends an item to its container list unless the id is known anywhere.
    pub(crate) fn insert_item(&mut self, item: Item) -> bool {
        if self.item(item.id).is_some() {
            return false;
        }
        self.items.entry(item.container_id).or_default().insert(0, item);
        true
    }

    /// Replaces an item record inside `container_id`'s list, keeping position.
    pub(crate) fn replace_item_in(&mut self, container_id: ContainerId, item: Item) -> bool {
        match self.items.get_mut(&container_id) {
            Some(list) => replace_by_id(list, item),
            None => false,
        }
    }

    /// Removes an item from `container_id`'s list only.
    pub(crate) fn take_item_from(
        &mut self,
        container_id: ContainerId,
        item_id: ItemId,
    ) -> Option<Item> {
        let list = self.items.get_mut(&container_id)?;
        let removed = remove_by_id(list, item_id);
        if list.is_empty() {
            self.items.remove(&container_id);
        }
        removed
    }

    /// Prepends an item to `container_id`'s list, updating its owner field.
    pub(crate) fn prepend_item_to(&mut self, container_id: ContainerId, mut item: Item) {
        item.container_id = container_id;
        self.items.entry(container_id).or_default().insert(0, item);
    }

    /// Inserts an item into `container_id`'s list at `index` (clamped).
    pub(crate) fn insert_item_at(
        &mut self,
        container_id: ContainerId,
        index: usize,
        mut item: Item,
    ) {
        item.container_id = container_id;
        let list = self.items.entry(container_id).or_default();
        let index = index.min(list.len());
        list.insert(index, item);
    }

    /// Copies one container's item list for later verbatim restore.
    pub(crate) fn item_list_snapshot(&self, container_id: ContainerId) -> Vec<Item> {
        self.items_in(container_id).to_vec()
    }

    /// Restores one container's item list verbatim.
    pub(crate) fn restore_item_list(&mut self, container_id: ContainerId, items: Vec<Item>) {
        if items.is_empty() {
            self.items.remove(&container_id);
        } else {
            self.items.insert(container_id, items);
        }
    }

    /// Removes one item wherever it is.
    pub(crate) fn remove_item(&mut self, item_id: ItemId) -> Option<Item> {
        let container_id = self.locate_item(item_id)?;
        self.take_item_from(container_id, item_id)
    }

    pub(crate) fn remove_cell(&mut self, cell_id: CellId) -> Option<Cell> {
        remove_by_id(&mut self.cells, cell_id)
    }

    pub(crate) fn remove_edge(&mut self, edge_id: EdgeId) -> Option<Edge> {
        remove_by_id(&mut self.edges, edge_id)
    }

    /// Removes a container, its items, and edges touching it.
    pub(crate) fn remove_container(&mut self, container_id: ContainerId) -> Removal {
        let mut removal = Removal::default();
        if remove_by_id(&mut self.containers, container_id).is_some() {
            removal.containers.push(container_id);
        }
        if let Some(items) = self.items.remove(&container_id) {
            removal.items.extend(items.iter().map(|item| item.id));
        }
        self.edges.retain(|edge| {
            if edge.touches(container_id) {
                removal.edges.push(edge.id);
                false
            } else {
                true
            }
        });
        removal
    }

    /// Removes a region with its cells, containers, and their items.
    pub(crate) fn remove_region(&mut self, region_id: RegionId) -> Removal {
        let mut removal = Removal::default();
        if remove_by_id(&mut self.regions, region_id).is_some() {
            removal.regions.push(region_id);
        }
        self.cells.retain(|cell| {
            if cell.region_id == region_id {
                removal.cells.push(cell.id);
                false
            } else {
                true
            }
        });
        let owned: Vec<ContainerId> = self
            .containers
            .iter()
            .filter(|container| container.region_id == region_id)
            .map(|container| container.id)
            .collect();
        for container_id in owned {
            removal.absorb(self.remove_container(container_id));
        }
        removal
    }

    /// Drops any record with `id`, cascading like an explicit delete.
    pub(crate) fn invalidate(&mut self, id: Uuid) -> Removal {
        if self.region(id).is_some() {
            return self.remove_region(id);
        }
        if self.container(id).is_some() {
            return self.remove_container(id);
        }
        let mut removal = Removal::default();
        if self.remove_item(id).is_some() {
            removal.items.push(id);
        } else if self.remove_cell(id).is_some() {
            removal.cells.push(id);
        } else if self.remove_edge(id).is_some() {
            removal.edges.push(id);
        }
        removal
    }

    /// Replaces every collection with the snapshot contents.
    ///
    /// Snapshot order is kept; a duplicated item id keeps its first occurrence.
    pub(crate) fn replace_all(&mut self, snapshot: ScopeSnapshot) {
        self.regions = dedup_by_id(snapshot.regions);
        self.cells = dedup_by_id(snapshot.cells);
        self.containers = dedup_by_id(snapshot.containers);
        self.edges = dedup_by_id(snapshot.edges);
        self.items.clear();
        for item in dedup_by_id(snapshot.items) {
            self.items.entry(item.container_id).or_default().push(item);
        }
    }
}

fn prepend_if_absent<T: SyncEntity>(list: &mut Vec<T>, record: T) -> bool {
    if list.iter().any(|existing| existing.id() == record.id()) {
        return false;
    }
    list.insert(0, record);
    true
}

fn replace_by_id<T: SyncEntity>(list: &mut [T], record: T) -> bool {
    match list.iter_mut().find(|existing| existing.id() == record.id()) {
        Some(slot) => {
            *slot = record;
            true
        }
        None => false,
    }
}

fn remove_by_id<T: SyncEntity>(list: &mut Vec<T>, id: Uuid) -> Option<T> {
    let index = list.iter().position(|existing| existing.id() == id)?;
    Some(list.remove(index))
}

fn dedup_by_id<T: SyncEntity>(records: Vec<T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.id()))
        .collect()
}
