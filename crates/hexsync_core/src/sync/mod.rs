//! Engine orchestration: hydration, optimistic moves, and the facade that
//! wires them to the feed, the store, and the remote collaborator.

pub mod engine;
pub mod hydration;
pub mod moves;
