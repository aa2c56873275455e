//! # roomvisor
//!
//! **Roomvisor** ingests live chat-room event streams from a pub/sub websocket
//! upstream, one supervised session per tracked channel, and hands structured
//! events to a storage backend.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!        add / pause / resume / stop / resume_all / shutdown
//!                               │
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Orchestrator                                                     │
//! │  - Registry (one supervision entry per channel name)              │
//! │  - Bus (broadcast lifecycle events)                               │
//! │  - SubscriberSet (StatusTracker, LogWriter, user subscribers)     │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │ChannelSuper- │   │ChannelSuper- │   │ChannelSuper- │  two-track retry,
//!  │visor "xqc"   │   │visor "foo"   │   │visor "bar"   │  cancellable backoff
//!  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!         ▼                  ▼                  ▼
//!      Session            Session            Session        resolve → connect →
//!         │                  │                  │           subscribe → keepalive →
//!         ▼                  ▼                  ▼           recv (≤1s) → classify
//!   ┌───────────┬────────────────────┬───────────────┐
//!   │ Ignored   │ Handled            │ Unhandled     │
//!   │ (dropped) │ → Storage          │ → OverflowLog │
//!   └───────────┴────────────────────┴───────────────┘
//! ```
//!
//! ### Retry tracks
//! ```text
//! failure ──► close code ∈ {4200, 1011}? ──yes──► connection track: max 50,
//!                 │                               min(1.5^min(n,8), 30)s, then 30s
//!                 └──no───────────────────────► generic track: max 10, 2s × 2^(n-1)
//! counters reset after any attempt that received at least one frame
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------|---------------------------------------------|
//! | **Orchestration** | Supervise many channels, idempotent start/stop, shutdown    | [`Orchestrator`]                            |
//! | **Policies**      | Two-track retry with backoff curves                         | [`RetryPolicy`], [`BackoffPolicy`]          |
//! | **Protocol**      | Envelope decoding and three-way classification              | [`Classifier`], [`MessageKind`]             |
//! | **Collaborators** | Lookup, storage and transport seams                         | [`ChannelLookup`], [`Storage`], [`Connector`] |
//! | **Subscriber API**| Observe lifecycle events                                    | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors with stable labels                             | [`SessionError`], [`OrchestratorError`]     |
//!
//! ## Optional features
//! - `sqlite` (default): [`SqliteStorage`].
//! - `postgres`: [`PostgresStorage`] over tokio-postgres.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use roomvisor::{Config, HttpLookup, MemoryStorage, Orchestrator, WsConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let lookup = HttpLookup::new(cfg.lookup_base_url.clone(), cfg.lookup_timeout)?;
//!
//!     let orch = Orchestrator::new(
//!         cfg,
//!         Arc::new(MemoryStorage::new()),
//!         Arc::new(lookup),
//!         Arc::new(WsConnector::default()),
//!         Vec::new(),
//!     );
//!
//!     orch.add_channel("xqc").await?;
//!     roomvisor::wait_for_shutdown_signal().await?;
//!     orch.shutdown().await;
//!     Ok(())
//! }
//! ```

mod channel;
mod config;
mod core;
mod error;
mod events;
mod lookup;
mod policies;
mod protocol;
mod storage;
mod subscribers;
mod transport;

#[cfg(test)]
mod testutil;

// ---- Public re-exports ----

pub use channel::ChannelName;
pub use config::{Config, DEFAULT_ENDPOINT, DEFAULT_LOOKUP_URL, DEFAULT_OVERFLOW_LOG};
pub use core::{
    AddOutcome, ChannelListing, Orchestrator, ResumeSummary, StartOutcome, StopOutcome,
    wait_for_shutdown_signal,
};
pub use error::{
    Closure, FailureClass, LookupError, OrchestratorError, SessionError, StoreError,
};
pub use events::{Event, EventKind};
pub use lookup::{ChannelLookup, HttpLookup, ResolvedChannel};
pub use policies::{BackoffPolicy, JitterPolicy, RetryDecision, RetryPolicy, RetryState, RetryTrack};
pub use protocol::{
    Classification, Classifier, Envelope, MessageKind, OverflowLog, StructuredEvent,
};
pub use storage::{ChannelRecord, ChannelStats, EventRow, MemoryStorage, Storage};
#[cfg(feature = "postgres")]
pub use storage::{PostgresOptions, PostgresStorage};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;
pub use subscribers::{ChannelStatus, LogWriter, StatusTracker, Subscribe};
pub use transport::{Connector, Transport, WsConnector, WsTransport};
