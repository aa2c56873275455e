//! Runtime core: sessions, supervision and orchestration.
//!
//! The public surface of this module is [`Orchestrator`] and its outcome types.
//!
//! Internal modules:
//! - [`session`]: one connection attempt (resolve, subscribe, keepalive, receive, dispatch);
//! - [`supervisor`]: runs sessions for one channel under the two-track retry policy;
//! - [`registry`]: supervision entries keyed by channel name;
//! - [`orchestrator`]: start/stop/shutdown/resume and the lifecycle event pipeline;
//! - [`shutdown`]: OS termination signals.

mod orchestrator;
mod registry;
mod session;
mod shutdown;
mod supervisor;

pub use orchestrator::{
    AddOutcome, ChannelListing, Orchestrator, ResumeSummary, StartOutcome, StopOutcome,
};
pub use shutdown::wait_for_shutdown_signal;
