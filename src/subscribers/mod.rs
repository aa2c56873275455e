//! # Lifecycle event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in subscribers.
//!
//! ## Architecture
//! ```text
//! ChannelSupervisor ── publish(Event) ──► Bus ──► Orchestrator listener
//!                                                       │
//!                                                       ▼
//!                                                SubscriberSet::emit
//!                                         ┌─────────────┼─────────────┐
//!                                         ▼             ▼             ▼
//!                                   StatusTracker   LogWriter    user subscriber
//! ```
//!
//! - **Passive subscribers** observe and react (logging, alerts).
//! - **Stateful subscribers** keep derived state ([`StatusTracker`]).

mod embedded;
mod subscribe;
mod subscriber_set;

pub use embedded::{ChannelStatus, LogWriter, StatusTracker};
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
