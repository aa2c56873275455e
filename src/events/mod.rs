//! Lifecycle events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the orchestrator, channel
//! supervisors and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Orchestrator`, `ChannelSupervisor`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the orchestrator's listener, which fans out to `SubscriberSet`
//!   (and thereby `StatusTracker`, `LogWriter` and user subscribers).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
