//! Applies typed feed changes to the canonical store.
//!
//! # Responsibility
//! - Merge inserts, partial updates, and deletes idempotently.
//! - Turn an item's container change into a structural move.
//! - Report parents that need hydration and records removed by cascade.
//!
//! # Invariants
//! - Replaying any change is a no-op on the second application.
//! - An update never changes a record id.
//! - While an item has an outstanding local move, feed updates keep its
//!   optimistic container.

pub mod resolver;

use crate::feed::event::{Change, TableChange};
use crate::model::item::{Item, ItemId};
use crate::model::patch::{decode_record, merge_patch, patch_uuid_field, Patch};
use crate::model::zone::{Cell, ContainerId};
use crate::model::SyncEntity;
use crate::notify::{MoveNotice, SyncNotification};
use crate::store::{CanonicalStore, Removal, ScopeSnapshot};
use crate::sync::hydration::ParentKey;
use crate::sync::moves::MoveLedger;
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

pub use resolver::{PreviousContainerResolver, ScanResolver};

/// Side effects of applying one change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    /// Whether the store changed.
    pub applied: bool,
    pub notifications: Vec<SyncNotification>,
    /// Newly known parents whose children must be fetched.
    pub hydrate: Vec<ParentKey>,
    pub removal: Removal,
}

impl ApplyOutcome {
    fn unchanged() -> Self {
        Self::default()
    }

    fn changed() -> Self {
        Self {
            applied: true,
            ..Self::default()
        }
    }

    fn hydrating(parent: ParentKey) -> Self {
        Self {
            applied: true,
            hydrate: vec![parent],
            ..Self::default()
        }
    }

    fn removed(removal: Removal) -> Self {
        Self {
            applied: !removal.is_empty(),
            removal,
            ..Self::default()
        }
    }
}

enum Merge<T> {
    Merged(T),
    /// Unknown id with a complete record.
    Decoded(T),
    Dropped,
}

/// Stateless merge rules plus the previous-container lookup seam.
pub struct Reconciler {
    resolver: Box<dyn PreviousContainerResolver>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Box::new(ScanResolver))
    }
}

impl Reconciler {
    pub fn new(resolver: Box<dyn PreviousContainerResolver>) -> Self {
        Self { resolver }
    }

    /// Applies one decoded change.
    ///
    /// `ledger` is consulted for outstanding moves and told about item
    /// deletes so a late rollback cannot resurrect them.
    pub fn apply(
        &self,
        store: &mut CanonicalStore,
        ledger: &mut MoveLedger,
        change: TableChange,
    ) -> ApplyOutcome {
        match change {
            TableChange::Region(change) => match change {
                Change::Insert(region) => {
                    let id = region.id;
                    if store.insert_region(region) {
                        ApplyOutcome::hydrating(ParentKey::Region(id))
                    } else {
                        ApplyOutcome::unchanged()
                    }
                }
                Change::Update { id, patch, .. } => {
                    match merge_or_decode(store.region(id), id, &patch) {
                        Merge::Merged(region) => flag(store.replace_region(region)),
                        Merge::Decoded(region) => {
                            store.insert_region(region);
                            ApplyOutcome::hydrating(ParentKey::Region(id))
                        }
                        Merge::Dropped => ApplyOutcome::unchanged(),
                    }
                }
                Change::Delete { id } => {
                    let removal = store.remove_region(id);
                    ApplyOutcome::removed(removal)
                }
            },
            TableChange::Cell(change) => match change {
                Change::Insert(cell) => flag(self.insert_cell(store, cell)),
                Change::Update { id, patch, .. } => {
                    let current = store.cells().iter().find(|cell| cell.id == id);
                    match merge_or_decode(current, id, &patch) {
                        Merge::Merged(cell) => flag(store.replace_cell(cell)),
                        Merge::Decoded(cell) => flag(store.insert_cell(cell)),
                        Merge::Dropped => ApplyOutcome::unchanged(),
                    }
                }
                Change::Delete { id } => flag(store.remove_cell(id).is_some()),
            },
            TableChange::Container(change) => match change {
                Change::Insert(container) => {
                    let id = container.id;
                    if store.insert_container(container) {
                        ApplyOutcome::hydrating(ParentKey::Container(id))
                    } else {
                        ApplyOutcome::unchanged()
                    }
                }
                Change::Update { id, patch, .. } => {
                    match merge_or_decode(store.container(id), id, &patch) {
                        Merge::Merged(container) => flag(store.replace_container(container)),
                        Merge::Decoded(container) => {
                            store.insert_container(container);
                            ApplyOutcome::hydrating(ParentKey::Container(id))
                        }
                        Merge::Dropped => ApplyOutcome::unchanged(),
                    }
                }
                Change::Delete { id } => ApplyOutcome::removed(store.remove_container(id)),
            },
            TableChange::Item(change) => match change {
                Change::Insert(item) => flag(self.insert_item(store, item)),
                Change::Update { id, patch, old } => {
                    self.apply_item_update(store, ledger, id, &patch, old.as_ref())
                }
                Change::Delete { id } => {
                    ledger.mark_deleted(id);
                    match store.remove_item(id) {
                        Some(_) => ApplyOutcome::removed(Removal {
                            items: vec![id],
                            ..Removal::default()
                        }),
                        None => ApplyOutcome::unchanged(),
                    }
                }
            },
            TableChange::Edge(change) => match change {
                Change::Insert(edge) => flag(store.insert_edge(edge)),
                Change::Update { id, patch, .. } => {
                    let current = store.edges().iter().find(|edge| edge.id == id);
                    match merge_or_decode(current, id, &patch) {
                        Merge::Merged(edge) => flag(store.replace_edge(edge)),
                        Merge::Decoded(edge) => flag(store.insert_edge(edge)),
                        Merge::Dropped => ApplyOutcome::unchanged(),
                    }
                }
                Change::Delete { id } => flag(store.remove_edge(id).is_some()),
            },
        }
    }

    /// Inserts a fetched or pushed cell unless its id is known.
    pub fn insert_cell(&self, store: &mut CanonicalStore, cell: Cell) -> bool {
        store.insert_cell(cell)
    }

    /// Inserts a fetched or pushed item unless its id is known anywhere.
    pub fn insert_item(&self, store: &mut CanonicalStore, item: Item) -> bool {
        store.insert_item(item)
    }

    /// Drops any record with `id`, cascading as a delete would.
    pub fn invalidate(&self, store: &mut CanonicalStore, id: Uuid) -> Removal {
        let removal = store.invalidate(id);
        debug!(
            "event=reconcile_invalidate module=reconcile status=ok id={} removed={}",
            id,
            !removal.is_empty()
        );
        removal
    }

    /// Replaces every record with a freshly fetched snapshot.
    pub fn replace_all(&self, store: &mut CanonicalStore, snapshot: ScopeSnapshot) {
        store.replace_all(snapshot);
    }

    /// Container that holds `item_id` before applying an update.
    pub fn previous_container(
        &self,
        store: &CanonicalStore,
        item_id: ItemId,
        old: Option<&Patch>,
    ) -> Option<ContainerId> {
        let hint = old.and_then(|old| patch_uuid_field(old, "container_id"));
        if let Some(hint) = hint {
            if store.container_holds(hint, item_id) {
                return Some(hint);
            }
        }
        self.resolver.resolve_previous_container(store, item_id)
    }

    fn apply_item_update(
        &self,
        store: &mut CanonicalStore,
        ledger: &MoveLedger,
        id: ItemId,
        patch: &Patch,
        old: Option<&Patch>,
    ) -> ApplyOutcome {
        let Some(previous) = self.previous_container(store, id, old) else {
            return match merge_or_decode::<Item>(None, id, patch) {
                Merge::Decoded(item) => flag(store.insert_item(item)),
                _ => ApplyOutcome::unchanged(),
            };
        };
        let Some(current) = store
            .items_in(previous)
            .iter()
            .find(|item| item.id == id)
            .cloned()
        else {
            return ApplyOutcome::unchanged();
        };
        let Merge::Merged(mut merged) = merge_or_decode(Some(&current), id, patch) else {
            return ApplyOutcome::unchanged();
        };

        if merged.container_id == previous {
            let changed = merged != current;
            store.replace_item_in(previous, merged);
            return flag(changed);
        }

        if ledger.is_outstanding(id) {
            debug!(
                "event=reconcile_move_deferred module=reconcile status=skipped item={} \
                 feed_container={} local_container={}",
                id, merged.container_id, previous
            );
            merged.container_id = previous;
            let changed = merged != current;
            store.replace_item_in(previous, merged);
            return flag(changed);
        }

        let to = merged.container_id;
        store.take_item_from(previous, id);
        store.prepend_item_to(to, merged);
        debug!(
            "event=reconcile_item_moved module=reconcile status=ok item={} from={} to={}",
            id, previous, to
        );
        ApplyOutcome {
            applied: true,
            notifications: vec![SyncNotification::Moved(MoveNotice {
                item_id: id,
                from: previous,
                to,
                optimistic: false,
                token: None,
            })],
            ..ApplyOutcome::default()
        }
    }
}

fn flag(applied: bool) -> ApplyOutcome {
    if applied {
        ApplyOutcome::changed()
    } else {
        ApplyOutcome::unchanged()
    }
}

fn merge_or_decode<T: SyncEntity>(current: Option<&T>, id: Uuid, patch: &Patch) -> Merge<T> {
    match current {
        Some(current) => match merge_patch(current, patch) {
            Ok(merged) => Merge::Merged(merged),
            Err(err) => {
                warn!(
                    "event=reconcile_update_dropped module=reconcile status=error table={} id={} \
                     error={}",
                    T::TABLE,
                    id,
                    err
                );
                Merge::Dropped
            }
        },
        None => {
            let mut record = patch.clone();
            record
                .entry("id")
                .or_insert_with(|| Value::String(id.to_string()));
            match decode_record(&record) {
                Ok(decoded) => Merge::Decoded(decoded),
                Err(err) => {
                    warn!(
                        "event=reconcile_update_dropped module=reconcile status=skipped table={} \
                         id={} reason=unknown_partial error={}",
                        T::TABLE,
                        id,
                        err
                    );
                    Merge::Dropped
                }
            }
        }
    }
}
