//! Change-feed subscription supervisor.
//!
//! # Responsibility
//! - Open one channel per project scope and hand out generation-tagged
//!   handles.
//! - Gate every incoming message on handle freshness before decoding.
//! - Track channel health and decide when a failure is sustained.
//!
//! # Invariants
//! - A handle is current only while its generation matches the active
//!   subscription of its scope; every other handle dispatches nothing.
//! - Unsubscribing closes the transport channel exactly once.

use crate::feed::event::{decode_message, FeedError, FeedMessage, TableChange};
use crate::feed::transport::{ChangeFeedTransport, ChannelId, ChannelStatus, TransportError};
use crate::feed::ProjectScope;
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Opaque handle for one subscription generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    scope: ProjectScope,
    channel: ChannelId,
    generation: u64,
}

impl SubscriptionHandle {
    pub fn scope(&self) -> &ProjectScope {
        &self.scope
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Health of an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelHealth {
    Healthy,
    Degraded { since_ms: i64 },
}

/// Result of feeding a status report into the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    /// First failure after a healthy period.
    Degraded,
    /// Channel is back after a failure; messages may have been lost.
    Recovered,
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    health: ChannelHealth,
}

/// Supervises change-feed channels for any number of scopes.
pub struct ChangeFeedSubscriber<T: ChangeFeedTransport> {
    transport: T,
    next_generation: u64,
    active: BTreeMap<ProjectScope, ActiveSubscription>,
}

impl<T: ChangeFeedTransport> ChangeFeedSubscriber<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_generation: 0,
            active: BTreeMap::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens a channel for `scope`, replacing any previous subscription.
    pub fn subscribe(&mut self, scope: ProjectScope) -> Result<SubscriptionHandle, TransportError> {
        if let Some(previous) = self.active.remove(&scope) {
            self.transport.close_channel(previous.handle.channel);
            debug!(
                "event=feed_resubscribe module=feed status=ok scope={} old_generation={}",
                scope.project_id, previous.handle.generation
            );
        }

        let channel = self.transport.open_channel(&scope)?;
        self.next_generation += 1;
        let handle = SubscriptionHandle {
            scope,
            channel,
            generation: self.next_generation,
        };
        self.active.insert(
            scope,
            ActiveSubscription {
                handle,
                health: ChannelHealth::Healthy,
            },
        );
        info!(
            "event=feed_subscribe module=feed status=ok scope={} channel={} generation={}",
            scope.project_id, channel, handle.generation
        );
        Ok(handle)
    }

    /// Stops dispatch for `handle` and releases its channel.
    ///
    /// Returns `false` when the handle was already stale.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        if !self.is_current(handle) {
            return false;
        }
        self.active.remove(&handle.scope);
        self.transport.close_channel(handle.channel);
        info!(
            "event=feed_unsubscribe module=feed status=ok scope={} generation={}",
            handle.scope.project_id, handle.generation
        );
        true
    }

    pub fn is_current(&self, handle: &SubscriptionHandle) -> bool {
        self.active
            .get(&handle.scope)
            .map(|active| active.handle.generation == handle.generation)
            .unwrap_or(false)
    }

    pub fn current_handle(&self, scope: &ProjectScope) -> Option<SubscriptionHandle> {
        self.active.get(scope).map(|active| active.handle)
    }

    pub fn health(&self, scope: &ProjectScope) -> Option<ChannelHealth> {
        self.active.get(scope).map(|active| active.health)
    }

    /// Decodes `message` if `handle` is still current.
    ///
    /// Returns `None` for stale handles; decode failures are returned for the
    /// caller to log and drop.
    pub fn admit(
        &self,
        handle: &SubscriptionHandle,
        message: &FeedMessage,
    ) -> Option<Result<TableChange, FeedError>> {
        if !self.is_current(handle) {
            debug!(
                "event=feed_message_discarded module=feed status=stale generation={} table={}",
                handle.generation, message.table
            );
            return None;
        }
        Some(decode_message(message, &handle.scope))
    }

    /// Applies a transport health report for `handle`.
    ///
    /// Returns `None` for stale handles.
    pub fn report_status(
        &mut self,
        handle: &SubscriptionHandle,
        status: ChannelStatus,
        now_ms: i64,
    ) -> Option<HealthTransition> {
        if !self.is_current(handle) {
            return None;
        }
        let active = self.active.get_mut(&handle.scope)?;
        let transition = match (status.is_failure(), active.health) {
            (true, ChannelHealth::Healthy) => {
                active.health = ChannelHealth::Degraded { since_ms: now_ms };
                warn!(
                    "event=feed_degraded module=feed status={} scope={}",
                    status.as_str(),
                    handle.scope.project_id
                );
                HealthTransition::Degraded
            }
            (true, ChannelHealth::Degraded { .. }) => HealthTransition::Unchanged,
            (false, ChannelHealth::Degraded { .. }) => {
                active.health = ChannelHealth::Healthy;
                info!(
                    "event=feed_recovered module=feed status=ok scope={}",
                    handle.scope.project_id
                );
                HealthTransition::Recovered
            }
            (false, ChannelHealth::Healthy) => HealthTransition::Unchanged,
        };
        Some(transition)
    }

    /// Returns whether `scope` has been failing for at least `grace_ms`.
    pub fn failure_sustained(&self, scope: &ProjectScope, now_ms: i64, grace_ms: i64) -> bool {
        match self.health(scope) {
            Some(ChannelHealth::Degraded { since_ms }) => now_ms - since_ms >= grace_ms,
            _ => false,
        }
    }
}
