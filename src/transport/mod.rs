//! # Full-duplex message transport.
//!
//! A session talks to the upstream through two seams:
//! - [`Connector`] opens one connection per attempt,
//! - [`Transport`] is that connection: text out, text in, keepalive ping, close.
//!
//! ```text
//! Session ──connect(url)──► Connector ──► Box<dyn Transport>
//!    │                                        │
//!    ├── send_text(subscribe) ───────────────►│
//!    ├── recv()  (wrapped in a 1s timeout) ◄──┤  text frames only
//!    ├── ping()  (wrapped in the pong timeout)│  buffers text seen while waiting
//!    └── close() ────────────────────────────►│
//! ```
//!
//! ## Rules
//! - `recv` and `ping` must be cancel-safe: dropping the future at any await
//!   point loses no text frame.
//! - A close frame surfaces as [`SessionError::Closed`] with its code; a stream
//!   that ends without one surfaces as an abnormal closure (1006).

mod ws;

use async_trait::async_trait;

use crate::error::SessionError;

pub use ws::{WsConnector, WsTransport};

/// One open connection.
#[async_trait]
pub trait Transport: Send {
    /// Sends a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), SessionError>;

    /// Waits for the next text frame, skipping control and binary frames.
    async fn recv(&mut self) -> Result<String, SessionError>;

    /// Sends a ping and waits for its pong.
    async fn ping(&mut self) -> Result<(), SessionError>;

    /// Closes the connection; errors are ignored.
    async fn close(&mut self);
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, SessionError>;
}
