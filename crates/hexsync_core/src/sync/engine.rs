//! Sync engine facade.
//!
//! # Responsibility
//! - Own the canonical store and route every mutation through the
//!   reconciler or the move coordinator.
//! - Drive the feed subscription lifecycle, periodic reload on sustained
//!   failure, and catch-up resync on recovery.
//! - Publish notifications to registered observers.
//!
//! # Invariants
//! - Collaborator calls are the only suspension points; every other step is
//!   synchronous with respect to the store.
//! - While the feed is failing past the grace period, full reloads run at
//!   most once per `reload_interval_ms`.
//! - Outstanding optimistic moves survive a full reload.

use crate::config::SyncConfig;
use crate::feed::event::{Change, FeedMessage, TableChange};
use crate::feed::subscriber::{ChangeFeedSubscriber, HealthTransition, SubscriptionHandle};
use crate::feed::transport::{ChangeFeedTransport, ChannelStatus, TransportError};
use crate::feed::ProjectScope;
use crate::model::item::{Item, ItemId};
use crate::model::participant::ParticipantId;
use crate::model::patch::{to_patch, Patch, PatchError};
use crate::model::zone::{
    Cell, Container, ContainerId, ContainerKind, Edge, EdgeId, EdgeKind, Region, RegionId,
};
use crate::model::SyncEntity;
use crate::notify::{NotificationBus, ObserverId, SyncNotification, SyncObserver};
use crate::presence::{ParticipantsBySession, PresenceRoster};
use crate::reconcile::{ApplyOutcome, PreviousContainerResolver, Reconciler};
use crate::remote::{RemoteError, RemoteResult, RemoteStore};
use crate::store::{CanonicalStore, Removal};
use crate::sync::hydration::{
    HydratedChildren, HydrationCoordinator, HydrationResult, HydrationTicket, ParentKey,
};
use crate::sync::moves::{
    MoveCoordinator, MoveError, MoveOutcome, MoveStart, MoveState, PendingMove,
};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Caller-facing engine failures.
#[derive(Debug)]
pub enum SyncError {
    NotStarted,
    Remote(RemoteError),
    Transport(TransportError),
    Move(MoveError),
    Record(PatchError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "sync engine is not started"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::Transport(err) => write!(f, "{err}"),
            Self::Move(err) => write!(f, "{err}"),
            Self::Record(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotStarted => None,
            Self::Remote(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::Move(err) => Some(err),
            Self::Record(err) => Some(err),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

impl From<TransportError> for SyncError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<MoveError> for SyncError {
    fn from(value: MoveError) -> Self {
        Self::Move(value)
    }
}

impl From<PatchError> for SyncError {
    fn from(value: PatchError) -> Self {
        Self::Record(value)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// What happened to one delivered feed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDisposition {
    /// Handle was unsubscribed or replaced; nothing dispatched.
    Stale,
    /// Message could not be decoded.
    Dropped,
    Applied,
    /// Replay or duplicate; store unchanged.
    Unchanged,
}

/// Client-side synchronization engine for one project scope.
pub struct SyncEngine<R: RemoteStore, T: ChangeFeedTransport> {
    config: SyncConfig,
    scope: ProjectScope,
    remote: R,
    store: CanonicalStore,
    reconciler: Reconciler,
    subscriber: ChangeFeedSubscriber<T>,
    subscription: Option<SubscriptionHandle>,
    /// Set while no channel could be opened at all.
    subscribe_failed_since: Option<i64>,
    hydration: HydrationCoordinator,
    moves: MoveCoordinator,
    presence: PresenceRoster,
    bus: NotificationBus,
    started: bool,
    last_reload_ms: Option<i64>,
    resync_due: bool,
}

impl<R: RemoteStore, T: ChangeFeedTransport> SyncEngine<R, T> {
    pub fn new(scope: ProjectScope, remote: R, transport: T, config: SyncConfig) -> Self {
        Self {
            presence: PresenceRoster::new(config.presence_stale_ms),
            config,
            scope,
            remote,
            store: CanonicalStore::new(scope.project_id),
            reconciler: Reconciler::default(),
            subscriber: ChangeFeedSubscriber::new(transport),
            subscription: None,
            subscribe_failed_since: None,
            hydration: HydrationCoordinator::new(),
            moves: MoveCoordinator::new(),
            bus: NotificationBus::new(),
            started: false,
            last_reload_ms: None,
            resync_due: false,
        }
    }

    /// Swaps the previous-container lookup used for item moves.
    pub fn with_resolver(mut self, resolver: Box<dyn PreviousContainerResolver>) -> Self {
        self.reconciler = Reconciler::new(resolver);
        self
    }

    pub fn scope(&self) -> &ProjectScope {
        &self.scope
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &CanonicalStore {
        &self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn transport(&self) -> &T {
        self.subscriber.transport()
    }

    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription
    }

    pub fn hydration(&self) -> &HydrationCoordinator {
        &self.hydration
    }

    pub fn moves(&self) -> &MoveCoordinator {
        &self.moves
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn last_reload_ms(&self) -> Option<i64> {
        self.last_reload_ms
    }

    pub fn subscribe_notifications(&mut self, observer: Arc<dyn SyncObserver>) -> ObserverId {
        self.bus.subscribe(observer)
    }

    pub fn unsubscribe_notifications(&mut self, id: ObserverId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Subscribes to the feed and loads the whole scope.
    ///
    /// A failed subscribe counts as a channel failure and is retried by
    /// `tick`. A failed load is reported and retried by `tick` as well.
    pub fn start(&mut self, now_ms: i64) -> SyncResult<()> {
        self.started = true;
        info!(
            "event=engine_start module=engine status=ok scope={}",
            self.scope.project_id
        );
        self.try_subscribe(now_ms);
        let loaded = self.full_resync(now_ms);
        if loaded.is_err() {
            self.resync_due = true;
        }
        loaded
    }

    /// Cancels the subscription; later messages for its handle are no-ops.
    pub fn stop(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.subscriber.unsubscribe(&handle);
        }
        self.started = false;
        self.subscribe_failed_since = None;
        info!(
            "event=engine_stop module=engine status=ok scope={}",
            self.scope.project_id
        );
    }

    /// Decodes and applies one change-feed message.
    pub fn handle_feed(
        &mut self,
        handle: &SubscriptionHandle,
        message: &FeedMessage,
    ) -> FeedDisposition {
        match self.subscriber.admit(handle, message) {
            None => FeedDisposition::Stale,
            Some(Err(err)) => {
                warn!(
                    "event=feed_message_dropped module=engine status=error table={} error={}",
                    message.table, err
                );
                FeedDisposition::Dropped
            }
            Some(Ok(change)) => {
                if self.apply_change(change).applied {
                    FeedDisposition::Applied
                } else {
                    FeedDisposition::Unchanged
                }
            }
        }
    }

    /// Feeds a transport health report into the subscription.
    pub fn handle_channel_status(
        &mut self,
        handle: &SubscriptionHandle,
        status: ChannelStatus,
        now_ms: i64,
    ) -> Option<HealthTransition> {
        let transition = self.subscriber.report_status(handle, status, now_ms)?;
        match transition {
            HealthTransition::Degraded => self.bus.publish(&SyncNotification::ChannelDegraded),
            HealthTransition::Recovered => self.recovered(now_ms),
            HealthTransition::Unchanged => {}
        }
        Some(transition)
    }

    /// Periodic driver; returns whether a full reload ran.
    pub fn tick(&mut self, now_ms: i64) -> SyncResult<bool> {
        if !self.started {
            return Err(SyncError::NotStarted);
        }
        if self.subscription.is_none() {
            let previous_reload = self.last_reload_ms;
            self.try_subscribe(now_ms);
            if self.last_reload_ms != previous_reload {
                return Ok(true);
            }
        }
        let interval_elapsed = self
            .last_reload_ms
            .map(|last| now_ms - last >= self.config.reload_interval_ms)
            .unwrap_or(true);
        if !interval_elapsed || !(self.resync_due || self.failure_sustained(now_ms)) {
            return Ok(false);
        }
        self.full_resync(now_ms)?;
        Ok(true)
    }

    /// Whether the feed has been failing for at least the grace period.
    pub fn failure_sustained(&self, now_ms: i64) -> bool {
        let grace_ms = self.config.failure_grace_ms;
        match self.subscription {
            None => self
                .subscribe_failed_since
                .is_some_and(|since| now_ms - since >= grace_ms),
            Some(_) => self
                .subscriber
                .failure_sustained(&self.scope, now_ms, grace_ms),
        }
    }

    /// Replaces the store with a bulk fetch, then re-applies pending moves.
    pub fn full_resync(&mut self, now_ms: i64) -> SyncResult<()> {
        self.last_reload_ms = Some(now_ms);
        let snapshot = match self.remote.fetch_scope(&self.scope) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(
                    "event=resync_failed module=engine status=error scope={} error={}",
                    self.scope.project_id, err
                );
                return Err(err.into());
            }
        };
        self.reconciler.replace_all(&mut self.store, snapshot);
        let reapplied = self.moves.reapply_outstanding(&mut self.store);
        self.resync_due = false;
        let notification = SyncNotification::Resynced {
            regions: self.store.regions().len(),
            containers: self.store.containers().len(),
            items: self.store.item_count(),
        };
        info!(
            "event=resync_finished module=engine status=ok scope={} items={} reapplied_moves={}",
            self.scope.project_id,
            self.store.item_count(),
            reapplied
        );
        self.bus.publish(&notification);
        Ok(())
    }

    /// Drops any record with `id` so the next load or hydration refetches it.
    pub fn invalidate(&mut self, id: Uuid) -> Removal {
        self.reconciler.invalidate(&mut self.store, id)
    }

    /// Applies a move locally and returns the pending command.
    ///
    /// `Ok(None)` when source and destination are equal.
    pub fn begin_move(
        &mut self,
        item_id: ItemId,
        from: ContainerId,
        to: ContainerId,
    ) -> SyncResult<Option<PendingMove>> {
        match self.moves.begin(&mut self.store, item_id, from, to)? {
            MoveStart::NoOp => Ok(None),
            MoveStart::Applied {
                pending,
                notifications,
            } => {
                self.bus.publish_all(&notifications);
                Ok(Some(pending))
            }
        }
    }

    /// Settles a pending move with the collaborator response.
    pub fn complete_move(
        &mut self,
        pending: PendingMove,
        response: RemoteResult<Option<Item>>,
        now_ms: i64,
    ) -> MoveOutcome {
        let outcome = self.moves.complete(&mut self.store, pending, response);
        self.bus.publish_all(&outcome.notifications);
        if outcome.resync_required {
            self.resync_now_or_later(now_ms);
        }
        outcome
    }

    /// Full move round trip against the collaborator.
    pub fn move_item(
        &mut self,
        item_id: ItemId,
        from: ContainerId,
        to: ContainerId,
        now_ms: i64,
    ) -> SyncResult<MoveState> {
        let Some(pending) = self.begin_move(item_id, from, to)? else {
            return Ok(MoveState::Idle);
        };
        let response = self.remote.move_item(item_id, to);
        Ok(self.complete_move(pending, response, now_ms).state)
    }

    /// Admits a child fetch for `parent` unless one is running.
    pub fn begin_hydration(&mut self, parent: ParentKey) -> Option<HydrationTicket> {
        self.hydration.begin(parent)
    }

    pub fn complete_hydration(
        &mut self,
        ticket: HydrationTicket,
        fetched: RemoteResult<HydratedChildren>,
    ) -> HydrationResult {
        self.hydration
            .finish(ticket, fetched, &mut self.store, &self.reconciler)
    }

    pub fn create_region(
        &mut self,
        name: &str,
        color: Option<String>,
        cells: &[(i32, i32)],
    ) -> SyncResult<Region> {
        let mut region = Region::new(self.scope.project_id, name);
        region.color = color;
        let cells: Vec<Cell> = cells
            .iter()
            .map(|(q, r)| Cell::new(region.id, *q, *r))
            .collect();
        let created = self.remote.create_region(&region, &cells)?;
        self.apply_change(TableChange::Region(Change::Insert(created.clone())));
        Ok(created)
    }

    pub fn update_region(&mut self, region_id: RegionId, patch: &Patch) -> SyncResult<Region> {
        let updated = self.remote.update_region(region_id, patch)?;
        self.apply_confirmed(&updated, TableChange::Region)?;
        Ok(updated)
    }

    pub fn delete_region(&mut self, region_id: RegionId) -> SyncResult<bool> {
        let deleted = self.remote.delete_region(region_id)?;
        self.apply_change(TableChange::Region(Change::Delete { id: region_id }));
        Ok(deleted)
    }

    pub fn create_container(
        &mut self,
        region_id: RegionId,
        q: i32,
        r: i32,
        kind: ContainerKind,
        title: &str,
    ) -> SyncResult<Container> {
        let container = Container::new(region_id, q, r, kind, title);
        let created = self.remote.create_container(&container)?;
        self.apply_change(TableChange::Container(Change::Insert(created.clone())));
        Ok(created)
    }

    pub fn update_container(
        &mut self,
        container_id: ContainerId,
        patch: &Patch,
    ) -> SyncResult<Container> {
        let updated = self.remote.update_container(container_id, patch)?;
        self.apply_confirmed(&updated, TableChange::Container)?;
        Ok(updated)
    }

    pub fn delete_container(&mut self, container_id: ContainerId) -> SyncResult<bool> {
        let deleted = self.remote.delete_container(container_id)?;
        self.apply_change(TableChange::Container(Change::Delete { id: container_id }));
        Ok(deleted)
    }

    pub fn create_item(&mut self, container_id: ContainerId, fields: &Patch) -> SyncResult<Item> {
        let created = self.remote.create_item(container_id, fields)?;
        self.apply_change(TableChange::Item(Change::Insert(created.clone())));
        Ok(created)
    }

    pub fn update_item(&mut self, item_id: ItemId, patch: &Patch) -> SyncResult<Item> {
        let updated = self.remote.update_item(item_id, patch)?;
        self.apply_confirmed(&updated, TableChange::Item)?;
        Ok(updated)
    }

    pub fn delete_item(&mut self, item_id: ItemId) -> SyncResult<bool> {
        let deleted = self.remote.delete_item(item_id)?;
        self.apply_change(TableChange::Item(Change::Delete { id: item_id }));
        Ok(deleted)
    }

    pub fn create_edge(
        &mut self,
        source_id: ContainerId,
        target_id: ContainerId,
        kind: EdgeKind,
    ) -> SyncResult<Edge> {
        let created = self
            .remote
            .create_edge(&Edge::new(source_id, target_id, kind))?;
        self.apply_change(TableChange::Edge(Change::Insert(created.clone())));
        Ok(created)
    }

    pub fn delete_edge(&mut self, edge_id: EdgeId) -> SyncResult<bool> {
        let deleted = self.remote.delete_edge(edge_id)?;
        self.apply_change(TableChange::Edge(Change::Delete { id: edge_id }));
        Ok(deleted)
    }

    /// Records a participant heartbeat and returns the live roster.
    pub fn touch_presence(
        &mut self,
        session_id: &str,
        participant_id: ParticipantId,
        last_seen_ms: i64,
        now_ms: i64,
    ) -> ParticipantsBySession {
        self.presence
            .touch(session_id, participant_id, last_seen_ms, now_ms)
    }

    pub fn live_participants(&self, now_ms: i64) -> ParticipantsBySession {
        self.presence.live(now_ms)
    }

    fn apply_change(&mut self, change: TableChange) -> ApplyOutcome {
        let outcome = self
            .reconciler
            .apply(&mut self.store, self.moves.ledger_mut(), change);
        self.bus.publish_all(&outcome.notifications);
        for parent in &outcome.hydrate {
            self.hydrate(*parent);
        }
        outcome
    }

    fn apply_confirmed<E: SyncEntity>(
        &mut self,
        record: &E,
        wrap: fn(Change<E>) -> TableChange,
    ) -> SyncResult<()> {
        let patch = to_patch(record)?;
        self.apply_change(wrap(Change::Update {
            id: record.id(),
            patch,
            old: None,
        }));
        Ok(())
    }

    fn hydrate(&mut self, parent: ParentKey) {
        let Some(ticket) = self.hydration.begin(parent) else {
            return;
        };
        let fetched = self.hydration.fetch(&self.remote, &ticket);
        self.hydration
            .finish(ticket, fetched, &mut self.store, &self.reconciler);
    }

    fn try_subscribe(&mut self, now_ms: i64) {
        match self.subscriber.subscribe(self.scope) {
            Ok(handle) => {
                self.subscription = Some(handle);
                if self.subscribe_failed_since.take().is_some() {
                    self.recovered(now_ms);
                }
            }
            Err(err) => {
                if self.subscribe_failed_since.is_none() {
                    self.subscribe_failed_since = Some(now_ms);
                    self.bus.publish(&SyncNotification::ChannelDegraded);
                }
                warn!(
                    "event=subscribe_failed module=engine status=error scope={} error={}",
                    self.scope.project_id, err
                );
            }
        }
    }

    fn recovered(&mut self, now_ms: i64) {
        self.bus.publish(&SyncNotification::ChannelRecovered);
        debug!(
            "event=catch_up_resync module=engine status=started scope={}",
            self.scope.project_id
        );
        self.resync_now_or_later(now_ms);
    }

    fn resync_now_or_later(&mut self, now_ms: i64) {
        if self.full_resync(now_ms).is_err() {
            self.resync_due = true;
        }
    }
}
