//! # Wire envelope.
//!
//! Inbound frames are `{"event": <name>, "data": <JSON or string>, "channel": <topic>?}`.
//! When `data` is a string it carries JSON encoded a second time; [`Envelope::decode`]
//! unwraps it so the classifier always sees a structured payload. A string that is
//! not valid JSON is kept as-is. The frame text itself is kept in [`Envelope::raw`]
//! for sinks that must record what arrived on the wire.
//!
//! Outbound, a session sends exactly one subscribe frame:
//! ```text
//! {"event":"pusher:subscribe","data":{"auth":"","channel":"chatrooms.<id>.v2"}}
//! ```

use serde::Deserialize;
use serde_json::{Value, json};

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    /// Event name used for classification.
    pub event: String,
    /// Payload with double-encoded strings unwrapped.
    #[serde(default)]
    pub data: Value,
    /// Topic the event was published on, if any.
    #[serde(default)]
    pub channel: Option<String>,
    /// The frame exactly as received.
    #[serde(skip)]
    pub raw: String,
}

impl Envelope {
    /// Decodes a text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let mut env: Envelope = serde_json::from_str(text)?;
        env.raw = text.to_string();
        if let Value::String(inner) = &env.data {
            if let Ok(parsed) = serde_json::from_str::<Value>(inner) {
                env.data = parsed;
            }
        }
        Ok(env)
    }
}

/// Builds the subscribe frame for `topic`.
pub fn subscribe_message(event: &str, topic: &str) -> String {
    json!({
        "event": event,
        "data": { "auth": "", "channel": topic },
    })
    .to_string()
}
