//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders lifecycle events as `tracing` records.
//! - [`StatusTracker`]: per-channel supervision status for `list`.

mod log;
mod status;

pub use log::LogWriter;
pub use status::{ChannelStatus, StatusTracker};
