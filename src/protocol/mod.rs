//! Wire protocol: envelopes, subscribe frames, classification and the overflow sink.
//!
//! ## Contents
//! - [`Envelope`], [`subscribe_message`] inbound decoding and the outbound subscribe frame
//! - [`Classifier`], [`Classification`], [`MessageKind`], [`StructuredEvent`] three-way split
//! - [`OverflowLog`] append-only sink recording unhandled frames as received

mod classifier;
mod envelope;
mod overflow;

pub use classifier::{
    Classification, Classifier, DEFAULT_IGNORED_EVENTS, MessageKind, StructuredEvent,
};
pub use envelope::{Envelope, subscribe_message};
pub use overflow::OverflowLog;
