//! Lookup of an item's previous container when the feed omits it.

use crate::model::item::ItemId;
use crate::model::zone::ContainerId;
use crate::store::CanonicalStore;

/// Finds which container currently holds an item.
///
/// Consulted only when the change feed's `old` record does not name a
/// container that really holds the item.
pub trait PreviousContainerResolver {
    fn resolve_previous_container(
        &self,
        store: &CanonicalStore,
        item_id: ItemId,
    ) -> Option<ContainerId>;
}

/// Linear scan over every container list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanResolver;

impl PreviousContainerResolver for ScanResolver {
    fn resolve_previous_container(
        &self,
        store: &CanonicalStore,
        item_id: ItemId,
    ) -> Option<ContainerId> {
        store.locate_item(item_id)
    }
}

impl<F> PreviousContainerResolver for F
where
    F: Fn(&CanonicalStore, ItemId) -> Option<ContainerId>,
{
    fn resolve_previous_container(
        &self,
        store: &CanonicalStore,
        item_id: ItemId,
    ) -> Option<ContainerId> {
        self(store, item_id)
    }
}
