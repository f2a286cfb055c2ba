//! Child fetches for newly known parents.
//!
//! # Invariants
//! - At most one fetch per parent id is in flight.
//! - Children of a parent deleted mid-flight are discarded.
//! - Children whose ids are already known stay untouched.

use crate::model::item::Item;
use crate::model::zone::{Cell, ContainerId, RegionId};
use crate::reconcile::Reconciler;
use crate::remote::{RemoteResult, RemoteStore};
use crate::store::CanonicalStore;
use log::{debug, info, warn};
use std::collections::HashSet;

/// Parent whose children are fetched on first sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentKey {
    /// Children are cells.
    Region(RegionId),
    /// Children are items.
    Container(ContainerId),
}

impl ParentKey {
    fn label(self) -> &'static str {
        match self {
            Self::Region(_) => "region",
            Self::Container(_) => "container",
        }
    }

    fn id(self) -> uuid::Uuid {
        match self {
            Self::Region(id) | Self::Container(id) => id,
        }
    }

    fn exists_in(self, store: &CanonicalStore) -> bool {
        match self {
            Self::Region(id) => store.region(id).is_some(),
            Self::Container(id) => store.container(id).is_some(),
        }
    }
}

/// Proof that a fetch for one parent was admitted.
#[derive(Debug, PartialEq, Eq)]
pub struct HydrationTicket {
    parent: ParentKey,
}

impl HydrationTicket {
    pub fn parent(&self) -> ParentKey {
        self.parent
    }
}

/// Children returned by a hydration fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum HydratedChildren {
    Cells(Vec<Cell>),
    Items(Vec<Item>),
}

/// How one hydration finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationResult {
    Inserted(usize),
    /// Parent was deleted while the fetch was in flight.
    Discarded,
    Failed,
}

#[derive(Debug, Default)]
pub struct HydrationCoordinator {
    in_flight: HashSet<ParentKey>,
}

impl HydrationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self, parent: ParentKey) -> bool {
        self.in_flight.contains(&parent)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Admits a fetch unless one is already running for `parent`.
    pub fn begin(&mut self, parent: ParentKey) -> Option<HydrationTicket> {
        if !self.in_flight.insert(parent) {
            debug!(
                "event=hydration_skipped module=hydration status=in_flight parent={} id={}",
                parent.label(),
                parent.id()
            );
            return None;
        }
        Some(HydrationTicket { parent })
    }

    /// Issues the collaborator fetch that matches `ticket`.
    pub fn fetch<R: RemoteStore + ?Sized>(
        &self,
        remote: &R,
        ticket: &HydrationTicket,
    ) -> RemoteResult<HydratedChildren> {
        match ticket.parent {
            ParentKey::Region(id) => remote.fetch_cells(id).map(HydratedChildren::Cells),
            ParentKey::Container(id) => remote.fetch_items(id).map(HydratedChildren::Items),
        }
    }

    /// Merges fetched children and releases the in-flight slot.
    pub fn finish(
        &mut self,
        ticket: HydrationTicket,
        fetched: RemoteResult<HydratedChildren>,
        store: &mut CanonicalStore,
        reconciler: &Reconciler,
    ) -> HydrationResult {
        let parent = ticket.parent;
        self.in_flight.remove(&parent);

        let children = match fetched {
            Ok(children) => children,
            Err(err) => {
                warn!(
                    "event=hydration_failed module=hydration status=error parent={} id={} error={}",
                    parent.label(),
                    parent.id(),
                    err
                );
                return HydrationResult::Failed;
            }
        };
        if !parent.exists_in(store) {
            debug!(
                "event=hydration_discarded module=hydration status=skipped parent={} id={}",
                parent.label(),
                parent.id()
            );
            return HydrationResult::Discarded;
        }

        let inserted = match children {
            HydratedChildren::Cells(cells) => cells
                .into_iter()
                .filter(|cell| cell.region_id == parent.id())
                .filter(|cell| reconciler.insert_cell(store, cell.clone()))
                .count(),
            HydratedChildren::Items(items) => {
                // Fetched order is display order; prepend from the back.
                items
                    .into_iter()
                    .rev()
                    .filter(|item| item.container_id == parent.id())
                    .filter(|item| reconciler.insert_item(store, item.clone()))
                    .count()
            }
        };
        info!(
            "event=hydration_finished module=hydration status=ok parent={} id={} inserted={}",
            parent.label(),
            parent.id(),
            inserted
        );
        HydrationResult::Inserted(inserted)
    }
}
