//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for plugging custom lifecycle observers into
//! the runtime. Each subscriber is driven by a dedicated worker loop fed by a
//! bounded queue owned by the [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching) and do **not** block supervisors
//!   or other subscribers.
//! - Each subscriber declares its queue capacity via [`Subscribe::queue_capacity`];
//!   on overflow its events are **dropped** and `SubscriberOverflow` is published.
//!
//! ## Example
//! ```rust
//! use roomvisor::{Event, EventKind, Subscribe};
//!
//! struct ExhaustionAlert;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for ExhaustionAlert {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::RetryExhausted {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "exhaustion-alert" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for lifecycle event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
