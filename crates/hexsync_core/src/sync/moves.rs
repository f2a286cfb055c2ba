//! Optimistic container-to-container item moves.
//!
//! # Responsibility
//! - Apply a user move to the canonical store before the server answers.
//! - Settle the move on response: adopt the canonical record, or roll back.
//! - Order overlapping moves of one item with monotonic move tokens.
//!
//! # Invariants
//! - Between apply and settle, the item is in exactly one list (`to`).
//! - A rejected move that no other change touched restores both lists
//!   verbatim.
//! - Only the latest token of an item may change the store on settle; older
//!   settles are `Superseded`.
//! - While an item has an outstanding token, feed events cannot change its
//!   container.

use crate::model::item::{Item, ItemId};
use crate::model::zone::ContainerId;
use crate::notify::{MoveNotice, SyncNotification};
use crate::remote::RemoteError;
use crate::store::CanonicalStore;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Monotonic per-move operation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoveToken(u64);

impl MoveToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl Display for MoveToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one move command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Idle,
    Applied,
    Confirmed,
    RolledBack,
    /// A newer move of the same item owns its position.
    Superseded,
}

/// Move applied locally and awaiting the server response.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMove {
    token: MoveToken,
    item_id: ItemId,
    from: ContainerId,
    to: ContainerId,
    from_snapshot: Vec<Item>,
    to_snapshot: Vec<Item>,
    state: MoveState,
}

impl PendingMove {
    pub fn token(&self) -> MoveToken {
        self.token
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn from(&self) -> ContainerId {
        self.from
    }

    pub fn to(&self) -> ContainerId {
        self.to
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    fn notice(&self) -> MoveNotice {
        MoveNotice {
            item_id: self.item_id,
            from: self.from,
            to: self.to,
            optimistic: true,
            token: Some(self.token),
        }
    }
}

/// Result of starting a move.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveStart {
    /// Source and destination are the same container.
    NoOp,
    Applied {
        pending: PendingMove,
        notifications: Vec<SyncNotification>,
    },
}

/// Result of settling a move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub state: MoveState,
    pub notifications: Vec<SyncNotification>,
    /// The local position can no longer be trusted; a full resync is due.
    pub resync_required: bool,
}

/// Move request validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    UnknownContainer(ContainerId),
    ItemNotInSource {
        item_id: ItemId,
        container_id: ContainerId,
    },
}

impl Display for MoveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownContainer(id) => write!(f, "container not found: {id}"),
            Self::ItemNotInSource {
                item_id,
                container_id,
            } => write!(f, "item {item_id} is not in container {container_id}"),
        }
    }
}

impl Error for MoveError {}

#[derive(Debug)]
struct LedgerEntry {
    latest: MoveToken,
    destination: ContainerId,
    outstanding: BTreeSet<MoveToken>,
    latest_confirmed: bool,
    superseded_failure: bool,
    deleted: bool,
}

struct Settlement {
    is_latest: bool,
    deleted: bool,
    resync_required: bool,
}

/// Per-item record of issued and outstanding move tokens.
#[derive(Debug, Default)]
pub struct MoveLedger {
    last_token: u64,
    entries: HashMap<ItemId, LedgerEntry>,
}

impl MoveLedger {
    /// Returns whether `item_id` has a move awaiting its response.
    pub fn is_outstanding(&self, item_id: ItemId) -> bool {
        self.entries.contains_key(&item_id)
    }

    pub fn latest_token(&self, item_id: ItemId) -> Option<MoveToken> {
        self.entries.get(&item_id).map(|entry| entry.latest)
    }

    /// Destination of the latest outstanding move of `item_id`.
    pub fn outstanding_destination(&self, item_id: ItemId) -> Option<ContainerId> {
        self.entries.get(&item_id).map(|entry| entry.destination)
    }

    /// Items with outstanding moves and their optimistic destinations.
    pub fn outstanding(&self) -> impl Iterator<Item = (ItemId, ContainerId)> + '_ {
        self.entries
            .iter()
            .map(|(item_id, entry)| (*item_id, entry.destination))
    }

    fn issue(&mut self, item_id: ItemId, destination: ContainerId) -> MoveToken {
        self.last_token += 1;
        let token = MoveToken(self.last_token);
        let entry = self.entries.entry(item_id).or_insert_with(|| LedgerEntry {
            latest: token,
            destination,
            outstanding: BTreeSet::new(),
            latest_confirmed: false,
            superseded_failure: false,
            deleted: false,
        });
        entry.latest = token;
        entry.destination = destination;
        entry.latest_confirmed = false;
        entry.outstanding.insert(token);
        token
    }

    /// Records that the item was deleted while a move was outstanding.
    pub(crate) fn mark_deleted(&mut self, item_id: ItemId) {
        if let Some(entry) = self.entries.get_mut(&item_id) {
            entry.deleted = true;
        }
    }

    fn settle(&mut self, item_id: ItemId, token: MoveToken, succeeded: bool) -> Settlement {
        let Some(entry) = self.entries.get_mut(&item_id) else {
            return Settlement {
                is_latest: false,
                deleted: false,
                resync_required: false,
            };
        };
        entry.outstanding.remove(&token);
        let is_latest = token == entry.latest;
        if is_latest {
            entry.latest_confirmed = succeeded;
        } else if !succeeded {
            entry.superseded_failure = true;
        }
        let deleted = entry.deleted;
        let mut resync_required = false;
        if entry.outstanding.is_empty() {
            // Server position is unknown when an older move failed and the
            // latest one did not confirm a position.
            resync_required = entry.superseded_failure && !entry.latest_confirmed && !deleted;
            self.entries.remove(&item_id);
        }
        Settlement {
            is_latest,
            deleted,
            resync_required,
        }
    }
}

/// Orchestrates optimistic moves against the canonical store.
#[derive(Debug, Default)]
pub struct MoveCoordinator {
    ledger: MoveLedger,
}

impl MoveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &MoveLedger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut MoveLedger {
        &mut self.ledger
    }

    /// Validates, snapshots, and applies a move locally.
    ///
    /// Snapshots are taken from the current store, which already reflects
    /// any earlier outstanding move of the same item.
    pub fn begin(
        &mut self,
        store: &mut CanonicalStore,
        item_id: ItemId,
        from: ContainerId,
        to: ContainerId,
    ) -> Result<MoveStart, MoveError> {
        if from == to {
            debug!("event=move_noop module=moves status=skipped item={item_id}");
            return Ok(MoveStart::NoOp);
        }
        for container_id in [from, to] {
            if store.container(container_id).is_none() {
                return Err(MoveError::UnknownContainer(container_id));
            }
        }
        let not_in_source = MoveError::ItemNotInSource {
            item_id,
            container_id: from,
        };
        if !store.container_holds(from, item_id) {
            return Err(not_in_source);
        }

        let from_snapshot = store.item_list_snapshot(from);
        let to_snapshot = store.item_list_snapshot(to);
        let item = store.take_item_from(from, item_id).ok_or(not_in_source)?;
        store.prepend_item_to(to, item);
        let token = self.ledger.issue(item_id, to);

        let pending = PendingMove {
            token,
            item_id,
            from,
            to,
            from_snapshot,
            to_snapshot,
            state: MoveState::Applied,
        };
        info!(
            "event=move_applied module=moves status=optimistic item={} from={} to={} token={}",
            item_id, from, to, token
        );
        let notice = pending.notice();
        Ok(MoveStart::Applied {
            pending,
            notifications: vec![
                SyncNotification::MoveStarted(notice),
                SyncNotification::Moved(notice),
            ],
        })
    }

    /// Settles a move with the collaborator's response.
    ///
    /// `Ok(Some(item))` confirms; `Ok(None)` and `Err(_)` roll back.
    pub fn complete(
        &mut self,
        store: &mut CanonicalStore,
        mut pending: PendingMove,
        response: Result<Option<Item>, RemoteError>,
    ) -> MoveOutcome {
        let canonical = match response {
            Ok(Some(item)) => Some(item),
            Ok(None) => {
                warn!(
                    "event=move_rejected module=moves status=error item={} token={}",
                    pending.item_id, pending.token
                );
                None
            }
            Err(err) => {
                warn!(
                    "event=move_failed module=moves status=error item={} token={} error={}",
                    pending.item_id, pending.token, err
                );
                None
            }
        };
        let settlement = self
            .ledger
            .settle(pending.item_id, pending.token, canonical.is_some());

        if !settlement.is_latest {
            pending.state = MoveState::Superseded;
            info!(
                "event=move_superseded module=moves status=skipped item={} token={}",
                pending.item_id, pending.token
            );
            return MoveOutcome {
                state: pending.state,
                notifications: Vec::new(),
                resync_required: settlement.resync_required,
            };
        }

        match canonical {
            Some(item) => {
                let confirmation = confirm(store, &pending, item);
                pending.state = MoveState::Confirmed;
                let mut outcome = MoveOutcome {
                    state: pending.state,
                    notifications: Vec::new(),
                    resync_required: settlement.resync_required,
                };
                match confirmation {
                    Confirmation::InPlace => {}
                    Confirmation::Relocated(notice) => {
                        outcome.notifications.push(SyncNotification::Moved(notice));
                    }
                    Confirmation::UnknownDestination => outcome.resync_required = true,
                }
                outcome
            }
            None => {
                roll_back(store, &pending, settlement.deleted);
                pending.state = MoveState::RolledBack;
                MoveOutcome {
                    state: pending.state,
                    notifications: vec![SyncNotification::MoveReverted(pending.notice())],
                    resync_required: settlement.resync_required,
                }
            }
        }
    }

    /// Re-applies outstanding optimistic positions after a bulk replace.
    ///
    /// Outstanding items absent from the reloaded store were deleted on the
    /// server; they are marked so a later rollback does not restore them.
    pub fn reapply_outstanding(&mut self, store: &mut CanonicalStore) -> usize {
        let outstanding: Vec<(ItemId, ContainerId)> = self.ledger.outstanding().collect();
        let mut reapplied = 0;
        for (item_id, destination) in outstanding {
            let Some(current) = store.locate_item(item_id) else {
                self.ledger.mark_deleted(item_id);
                continue;
            };
            if store.container(destination).is_none() {
                continue;
            }
            if current == destination {
                continue;
            }
            if let Some(item) = store.take_item_from(current, item_id) {
                store.prepend_item_to(destination, item);
                reapplied += 1;
            }
        }
        reapplied
    }
}

enum Confirmation {
    InPlace,
    Relocated(MoveNotice),
    /// Server placed the item in a container this store does not know.
    UnknownDestination,
}

fn confirm(store: &mut CanonicalStore, pending: &PendingMove, canonical: Item) -> Confirmation {
    let actual = canonical.container_id;
    if actual != pending.to {
        if store.container(actual).is_none() {
            warn!(
                "event=move_confirm_relocated module=moves status=skipped item={} actual={} \
                 reason=unknown_container",
                pending.item_id, actual
            );
            return Confirmation::UnknownDestination;
        }
        warn!(
            "event=move_confirm_relocated module=moves status=ok item={} expected={} actual={}",
            pending.item_id, pending.to, actual
        );
        if store.take_item_from(pending.to, pending.item_id).is_none() {
            return Confirmation::InPlace;
        }
        store.prepend_item_to(actual, canonical);
        return Confirmation::Relocated(MoveNotice {
            item_id: pending.item_id,
            from: pending.to,
            to: actual,
            optimistic: false,
            token: Some(pending.token),
        });
    }
    if store.replace_item_in(pending.to, canonical) {
        info!(
            "event=move_confirmed module=moves status=ok item={} token={}",
            pending.item_id, pending.token
        );
    } else {
        debug!(
            "event=move_confirm_discarded module=moves status=skipped item={} reason=item_gone",
            pending.item_id
        );
    }
    Confirmation::InPlace
}

fn roll_back(store: &mut CanonicalStore, pending: &PendingMove, deleted: bool) {
    let item_id = pending.item_id;
    let original_index = pending
        .from_snapshot
        .iter()
        .position(|item| item.id == item_id);

    if lists_untouched(store, pending) {
        store.restore_item_list(pending.from, pending.from_snapshot.clone());
        store.restore_item_list(pending.to, pending.to_snapshot.clone());
        info!("event=move_rolled_back module=moves status=ok item={item_id} mode=verbatim");
        return;
    }

    // Other changes landed in these lists meanwhile: only revert this item.
    let current = store.remove_item(item_id);
    let restore = !deleted && store.container(pending.from).is_some();
    if let (true, Some(index)) = (restore, original_index) {
        let record = current.unwrap_or_else(|| pending.from_snapshot[index].clone());
        store.insert_item_at(pending.from, index, record);
    }
    info!(
        "event=move_rolled_back module=moves status=ok item={} mode=targeted restored={}",
        item_id, restore
    );
}

fn lists_untouched(store: &CanonicalStore, pending: &PendingMove) -> bool {
    // A deleted container must not get its list back.
    if store.container(pending.from).is_none() || store.container(pending.to).is_none() {
        return false;
    }
    let expected_from = pending
        .from_snapshot
        .iter()
        .filter(|item| item.id != pending.item_id);
    if !store.items_in(pending.from).iter().eq(expected_from) {
        return false;
    }
    let Some(original) = pending
        .from_snapshot
        .iter()
        .find(|item| item.id == pending.item_id)
    else {
        return false;
    };
    let current_to = store.items_in(pending.to);
    let Some((head, rest)) = current_to.split_first() else {
        return false;
    };
    let mut optimistic = original.clone();
    optimistic.container_id = pending.to;
    *head == optimistic && rest == pending.to_snapshot.as_slice()
}

#[cfg(test)]
mod tests {
    use super::{MoveCoordinator, MoveError, MoveStart, MoveState, PendingMove};
    use crate::model::item::Item;
    use crate::model::zone::{Container, ContainerKind, Region};
    use crate::notify::SyncNotification;
    use crate::remote::RemoteError;
    use crate::store::CanonicalStore;
    use uuid::Uuid;

    struct Fixture {
        store: CanonicalStore,
        a: Container,
        b: Container,
        c: Container,
        x: Item,
    }

    fn fixture() -> Fixture {
        let mut store = CanonicalStore::new(Uuid::new_v4());
        let region = Region::new(store.project_id(), "Board");
        let a = Container::new(region.id, 0, 0, ContainerKind::Backlog, "A");
        let b = Container::new(region.id, 1, 0, ContainerKind::Sprint, "B");
        let c = Container::new(region.id, 2, 0, ContainerKind::Sprint, "C");
        let x = Item::new(a.id, "x");
        store.insert_region(region);
        for container in [&a, &b, &c] {
            store.insert_container(container.clone());
        }
        store.insert_item(Item::new(a.id, "neighbour"));
        store.insert_item(x.clone());
        Fixture { store, a, b, c, x }
    }

    fn applied(start: MoveStart) -> PendingMove {
        match start {
            MoveStart::Applied { pending, .. } => pending,
            MoveStart::NoOp => panic!("expected applied move"),
        }
    }

    #[test]
    fn same_container_is_noop() {
        let mut f = fixture();
        let before = f.store.clone();
        let mut moves = MoveCoordinator::new();
        let start = moves.begin(&mut f.store, f.x.id, f.a.id, f.a.id).unwrap();
        assert_eq!(start, MoveStart::NoOp);
        assert_eq!(f.store, before);
        assert!(!moves.ledger().is_outstanding(f.x.id));
    }

    #[test]
    fn begin_validates_source_and_containers() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let err = moves.begin(&mut f.store, f.x.id, f.b.id, f.c.id).unwrap_err();
        assert!(matches!(err, MoveError::ItemNotInSource { .. }));
        let unknown = Uuid::new_v4();
        let err = moves.begin(&mut f.store, f.x.id, f.a.id, unknown).unwrap_err();
        assert_eq!(err, MoveError::UnknownContainer(unknown));
    }

    #[test]
    fn begin_emits_optimistic_notifications() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        match moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap() {
            MoveStart::Applied {
                pending,
                notifications,
            } => {
                assert_eq!(pending.state(), MoveState::Applied);
                assert_eq!(notifications.len(), 2);
                assert!(matches!(
                    notifications[0],
                    SyncNotification::MoveStarted(notice) if notice.optimistic
                ));
                assert!(matches!(
                    notifications[1],
                    SyncNotification::Moved(notice) if notice.token == Some(pending.token())
                ));
            }
            MoveStart::NoOp => panic!("expected applied move"),
        }
        assert!(f.store.container_holds(f.b.id, f.x.id));
        assert!(!f.store.container_holds(f.a.id, f.x.id));
    }

    #[test]
    fn rejection_restores_exact_prior_state() {
        let mut f = fixture();
        let before = f.store.clone();
        let mut moves = MoveCoordinator::new();
        let pending = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        let outcome = moves.complete(&mut f.store, pending, Ok(None));
        assert_eq!(outcome.state, MoveState::RolledBack);
        assert!(!outcome.resync_required);
        assert_eq!(f.store, before);
    }

    #[test]
    fn transport_error_rolls_back_but_keeps_concurrent_arrivals() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let pending = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        let arrival = Item::new(f.b.id, "arrived meanwhile");
        f.store.insert_item(arrival.clone());

        let outcome = moves.complete(
            &mut f.store,
            pending,
            Err(RemoteError::Unavailable("offline".to_string())),
        );
        assert_eq!(outcome.state, MoveState::RolledBack);
        assert_eq!(f.store.items_in(f.a.id)[0].id, f.x.id);
        assert_eq!(f.store.items_in(f.a.id)[0].container_id, f.a.id);
        assert!(f.store.container_holds(f.b.id, arrival.id));
        assert!(!f.store.container_holds(f.b.id, f.x.id));
    }

    #[test]
    fn confirmation_replaces_record_in_destination() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let pending = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        let mut canonical = f.x.clone();
        canonical.container_id = f.b.id;
        canonical.status = Some("in_progress".to_string());

        let outcome = moves.complete(&mut f.store, pending, Ok(Some(canonical.clone())));
        assert_eq!(outcome.state, MoveState::Confirmed);
        assert_eq!(f.store.items_in(f.b.id), &[canonical]);
        assert!(!moves.ledger().is_outstanding(f.x.id));
    }

    #[test]
    fn overlapping_moves_last_move_wins() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let first = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        let second = applied(moves.begin(&mut f.store, f.x.id, f.b.id, f.c.id).unwrap());
        assert!(second.token() > first.token());
        assert_eq!(moves.ledger().outstanding_destination(f.x.id), Some(f.c.id));

        let mut stale = f.x.clone();
        stale.container_id = f.b.id;
        let outcome = moves.complete(&mut f.store, first, Ok(Some(stale)));
        assert_eq!(outcome.state, MoveState::Superseded);
        assert!(f.store.container_holds(f.c.id, f.x.id));

        let mut canonical = f.x.clone();
        canonical.container_id = f.c.id;
        let outcome = moves.complete(&mut f.store, second, Ok(Some(canonical)));
        assert_eq!(outcome.state, MoveState::Confirmed);
        assert!(!outcome.resync_required);
        assert!(f.store.container_holds(f.c.id, f.x.id));
    }

    #[test]
    fn overlapping_failures_require_resync() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let first = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        let second = applied(moves.begin(&mut f.store, f.x.id, f.b.id, f.c.id).unwrap());

        let outcome = moves.complete(&mut f.store, first, Ok(None));
        assert_eq!(outcome.state, MoveState::Superseded);
        assert!(!outcome.resync_required);

        let outcome = moves.complete(&mut f.store, second, Ok(None));
        assert_eq!(outcome.state, MoveState::RolledBack);
        assert!(outcome.resync_required);
        assert!(f.store.container_holds(f.b.id, f.x.id));
    }

    #[test]
    fn reapply_outstanding_restores_optimistic_position() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        let taken = f.store.take_item_from(f.b.id, f.x.id).unwrap();
        f.store.prepend_item_to(f.a.id, taken);

        assert_eq!(moves.reapply_outstanding(&mut f.store), 1);
        assert!(f.store.container_holds(f.b.id, f.x.id));
        assert_eq!(moves.reapply_outstanding(&mut f.store), 0);
    }

    #[test]
    fn confirmation_in_other_container_relocates_and_notifies() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let pending = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        let mut canonical = f.x.clone();
        canonical.container_id = f.c.id;

        let outcome = moves.complete(&mut f.store, pending, Ok(Some(canonical)));
        assert_eq!(outcome.state, MoveState::Confirmed);
        assert!(!outcome.resync_required);
        assert!(f.store.container_holds(f.c.id, f.x.id));
        assert!(f.store.items_in(f.b.id).is_empty());
        assert!(matches!(
            outcome.notifications.as_slice(),
            [SyncNotification::Moved(notice)]
                if !notice.optimistic && notice.from == f.b.id && notice.to == f.c.id
        ));
    }

    #[test]
    fn confirmation_in_unknown_container_requests_resync() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let pending = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        let mut canonical = f.x.clone();
        canonical.container_id = Uuid::new_v4();

        let outcome = moves.complete(&mut f.store, pending, Ok(Some(canonical.clone())));
        assert_eq!(outcome.state, MoveState::Confirmed);
        assert!(outcome.resync_required);
        assert!(outcome.notifications.is_empty());
        assert!(f.store.container_holds(f.b.id, f.x.id));
        assert!(f.store.items_in(canonical.container_id).is_empty());
    }

    #[test]
    fn rollback_skips_deleted_source_container() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let pending = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        f.store.remove_container(f.a.id);

        let outcome = moves.complete(&mut f.store, pending, Ok(None));
        assert_eq!(outcome.state, MoveState::RolledBack);
        assert!(f.store.items_in(f.a.id).is_empty());
        assert!(f.store.item(f.x.id).is_none());
    }

    #[test]
    fn reapply_marks_items_missing_after_reload() {
        let mut f = fixture();
        let mut moves = MoveCoordinator::new();
        let pending = applied(moves.begin(&mut f.store, f.x.id, f.a.id, f.b.id).unwrap());
        f.store.remove_item(f.x.id);

        assert_eq!(moves.reapply_outstanding(&mut f.store), 0);
        moves.complete(&mut f.store, pending, Ok(None));
        assert!(f.store.item(f.x.id).is_none());
    }
}
