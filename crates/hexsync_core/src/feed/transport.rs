//! Channel transport seam.
//!
//! The realtime transport is an external collaborator; the core only opens
//! and closes channels and listens to the health statuses it reports.

use crate::feed::ProjectScope;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ChannelId = u64;

/// Health status reported by the transport for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl ChannelStatus {
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Subscribed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::ChannelError => "channel_error",
            Self::TimedOut => "timed_out",
            Self::Closed => "closed",
        }
    }
}

/// Channel establishment failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Unavailable(String),
    Rejected(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "transport unavailable: {message}"),
            Self::Rejected(message) => write!(f, "channel rejected: {message}"),
        }
    }
}

impl Error for TransportError {}

/// Realtime transport contract.
pub trait ChangeFeedTransport {
    fn open_channel(&self, scope: &ProjectScope) -> Result<ChannelId, TransportError>;
    fn close_channel(&self, channel: ChannelId);
}

impl<T: ChangeFeedTransport + ?Sized> ChangeFeedTransport for &T {
    fn open_channel(&self, scope: &ProjectScope) -> Result<ChannelId, TransportError> {
        (**self).open_channel(scope)
    }

    fn close_channel(&self, channel: ChannelId) {
        (**self).close_channel(channel)
    }
}

/// In-process transport: hands out channel ids and records open channels.
///
/// Messages are pushed by the host directly into the engine; this type only
/// models the channel lifecycle (used by replay tooling and tests).
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    state: RefCell<LoopbackState>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    next_channel: ChannelId,
    open: BTreeSet<ChannelId>,
    refuse_open: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `open_channel` calls fail until reset.
    pub fn set_refuse_open(&self, refuse: bool) {
        self.state.borrow_mut().refuse_open = refuse;
    }

    pub fn open_channels(&self) -> Vec<ChannelId> {
        self.state.borrow().open.iter().copied().collect()
    }
}

impl ChangeFeedTransport for LoopbackTransport {
    fn open_channel(&self, scope: &ProjectScope) -> Result<ChannelId, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.refuse_open {
            return Err(TransportError::Unavailable(format!(
                "loopback refused {}",
                scope.channel_name()
            )));
        }
        state.next_channel += 1;
        let channel = state.next_channel;
        state.open.insert(channel);
        Ok(channel)
    }

    fn close_channel(&self, channel: ChannelId) {
        self.state.borrow_mut().open.remove(&channel);
    }
}
