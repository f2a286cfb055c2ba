//! Typed publish/subscribe bus for synchronization notifications.
//!
//! # Responsibility
//! - Deliver move and channel notifications to registered observers.
//! - Keep consumers statically typed instead of string-keyed.
//!
//! # Invariants
//! - Observers are invoked in registration order.
//! - An unsubscribed observer receives nothing further.

use crate::model::item::ItemId;
use crate::model::zone::ContainerId;
use crate::sync::moves::MoveToken;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Notification emitted by the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotification {
    /// A move began; emitted before any network response.
    MoveStarted(MoveNotice),
    /// An item changed container, locally (`optimistic`) or from the server.
    Moved(MoveNotice),
    /// A rejected move was rolled back.
    MoveReverted(MoveNotice),
    /// A full resynchronization replaced the store contents.
    Resynced { regions: usize, containers: usize, items: usize },
    /// The change-feed channel is failing; background reload is active.
    ChannelDegraded,
    /// The change-feed channel is healthy again.
    ChannelRecovered,
}

/// Payload shared by move notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveNotice {
    pub item_id: ItemId,
    pub from: ContainerId,
    pub to: ContainerId,
    pub optimistic: bool,
    /// Local move token; `None` for moves observed on the feed.
    pub token: Option<MoveToken>,
}

/// Observer contract for bus consumers.
pub trait SyncObserver {
    fn on_notification(&self, notification: &SyncNotification);
}

pub type ObserverId = u64;

/// Registry of observers owned by the engine.
#[derive(Default)]
pub struct NotificationBus {
    next_id: ObserverId,
    observers: BTreeMap<ObserverId, Arc<dyn SyncObserver>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one observer and returns its id.
    pub fn subscribe(&mut self, observer: Arc<dyn SyncObserver>) -> ObserverId {
        self.next_id += 1;
        self.observers.insert(self.next_id, observer);
        self.next_id
    }

    /// Removes one observer. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn publish(&self, notification: &SyncNotification) {
        for observer in self.observers.values() {
            observer.on_notification(notification);
        }
    }

    pub fn publish_all(&self, notifications: &[SyncNotification]) {
        for notification in notifications {
            self.publish(notification);
        }
    }
}

/// Observer that keeps every notification; used by hosts that poll.
#[derive(Default)]
pub struct RecordingObserver {
    received: std::sync::Mutex<Vec<SyncNotification>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the notifications received so far.
    pub fn take(&self) -> Vec<SyncNotification> {
        match self.received.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        }
    }
}

impl SyncObserver for RecordingObserver {
    fn on_notification(&self, notification: &SyncNotification) {
        if let Ok(mut guard) = self.received.lock() {
            guard.push(notification.clone());
        }
    }
}
