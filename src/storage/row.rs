//! # Row preparation.
//!
//! Flattens a [`StructuredEvent`] into the column set every backend stores.
//! Each dedicated [`MessageKind`] knows where its ids, author and text live;
//! [`MessageKind::Generic`] falls back to top-level `id`/`chatroom_id`/`created_at`.
//!
//! `content` only ever carries text the upstream sent (message bodies, host
//! messages); no descriptions are synthesized.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::protocol::{MessageKind, StructuredEvent};

/// Column values of one stored event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRow {
    pub event_type: String,
    pub event_id: Option<String>,
    pub chatroom_id: Option<String>,
    /// Upstream timestamp, RFC 3339 when it arrived as a unix time.
    pub timestamp: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub content: Option<String>,
    /// JSON of the acting user.
    pub sender_data: Option<String>,
    /// JSON of kind-specific extras.
    pub metadata: Option<String>,
    /// `{"event": <name>, "data": <payload>}`.
    pub raw_payload: String,
}

impl EventRow {
    /// Prepares the row for `event`.
    pub fn prepare(event: &StructuredEvent) -> Self {
        let d = &event.fields;
        let mut row = EventRow {
            event_type: event.kind.as_name().to_string(),
            raw_payload: json!({ "event": event.kind.as_name(), "data": d }).to_string(),
            ..Default::default()
        };

        match &event.kind {
            MessageKind::ChatMessage => {
                let sender = &d["sender"];
                row.event_id = scalar(&d["id"]);
                row.chatroom_id = scalar(&d["chatroom_id"]);
                row.timestamp = timestamp(&d["created_at"]);
                row.user_id = scalar(&sender["id"]);
                row.username = scalar(&sender["username"]);
                row.content = scalar(&d["content"]);
                row.sender_data = object(sender);
                row.metadata = object(&d["metadata"]);
            }
            MessageKind::Subscription => {
                row.chatroom_id = scalar(&d["chatroom_id"]);
                row.username = scalar(&d["username"]);
                row.sender_data =
                    Some(json!({ "username": d["username"], "months": d["months"] }).to_string());
                row.metadata = Some(json!({ "months": d["months"] }).to_string());
            }
            MessageKind::UserBanned => {
                let user = &d["user"];
                let by = &d["banned_by"];
                row.event_id = scalar(&d["id"]);
                row.timestamp = timestamp(&d["expires_at"]);
                row.user_id = scalar(&user["id"]);
                row.username = scalar(&user["username"]);
                row.sender_data = object(user);
                row.metadata = Some(
                    json!({
                        "banned_by": by,
                        "banned_by_username": by["username"],
                        "permanent": d["permanent"],
                        "duration": d["duration"],
                        "expires_at": d["expires_at"],
                    })
                    .to_string(),
                );
            }
            MessageKind::UserUnbanned => {
                let user = &d["user"];
                let by = &d["unbanned_by"];
                row.event_id = scalar(&d["id"]);
                row.user_id = scalar(&user["id"]);
                row.username = scalar(&user["username"]);
                row.sender_data = object(user);
                row.metadata = Some(
                    json!({
                        "unbanned_by": by,
                        "unbanned_by_username": by["username"],
                        "permanent": d["permanent"],
                    })
                    .to_string(),
                );
            }
            MessageKind::MessageDeleted => {
                row.event_id = scalar(&d["id"]);
                row.metadata = Some(
                    json!({
                        "deleted_message_id": d["message"]["id"],
                        "aiModerated": d["aiModerated"].as_bool().unwrap_or(false),
                        "violatedRules": d.get("violatedRules").cloned().unwrap_or_else(|| json!([])),
                    })
                    .to_string(),
                );
            }
            MessageKind::PinnedMessageCreated => {
                let msg = &d["message"];
                let sender = &msg["sender"];
                let pinned_by = &d["pinnedBy"];
                row.event_id = scalar(&msg["id"]);
                row.chatroom_id = scalar(&msg["chatroom_id"]);
                row.timestamp = timestamp(&msg["created_at"]);
                row.user_id = scalar(&sender["id"]);
                row.username = scalar(&sender["username"]);
                row.content = scalar(&msg["content"]);
                row.sender_data = object(sender);
                row.metadata = Some(
                    json!({
                        "duration": d["duration"],
                        "pinnedBy": pinned_by,
                        "pinned_by_username": pinned_by["username"],
                        "original_metadata": msg["metadata"],
                    })
                    .to_string(),
                );
            }
            MessageKind::ChatMessageSent => {
                let msg = &d["message"];
                let user = &d["user"];
                row.event_id = scalar(&msg["id"]);
                row.chatroom_id = scalar(&msg["chatroom_id"]);
                row.timestamp = timestamp(&msg["created_at"]);
                row.user_id = scalar(&user["id"]);
                row.username = scalar(&user["username"]);
                row.sender_data = object(user);
                row.metadata = Some(
                    json!({
                        "message_info": msg,
                        "months_subscribed": msg["months_subscribed"],
                        "subscriptions_count": msg["subscriptions_count"],
                    })
                    .to_string(),
                );
            }
            MessageKind::ChatroomUpdated => {
                row.event_id = scalar(&d["id"]);
                row.metadata = Some(
                    json!({
                        "slow_mode": d["slow_mode"],
                        "subscribers_mode": d["subscribers_mode"],
                        "followers_mode": d["followers_mode"],
                        "emotes_mode": d["emotes_mode"],
                        "advanced_bot_protection": d["advanced_bot_protection"],
                        "account_age": d["account_age"],
                    })
                    .to_string(),
                );
            }
            MessageKind::StreamHost => {
                row.chatroom_id = scalar(&d["chatroom_id"]);
                row.username = scalar(&d["host_username"]);
                row.content = scalar(&d["optional_message"]);
                row.metadata = Some(
                    json!({
                        "host_username": d["host_username"],
                        "number_viewers": d["number_viewers"],
                        "optional_message": d["optional_message"],
                    })
                    .to_string(),
                );
            }
            MessageKind::PinnedMessageDeleted => {
                row.metadata = Some("{}".to_string());
            }
            MessageKind::ChatroomClear => {
                row.event_id = scalar(&d["id"]);
                row.metadata = Some(json!({ "clear_id": d["id"] }).to_string());
            }
            MessageKind::Generic(_) => {
                row.event_id = scalar(&d["id"]);
                row.chatroom_id = scalar(&d["chatroom_id"]);
                row.timestamp = timestamp(&d["created_at"]);
                row.username = scalar(&d["username"]);
                row.content = scalar(&d["content"]);
                row.metadata = Some(d.to_string());
            }
        }
        row
    }
}

/// Strings and numbers as text; anything else is absent.
fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-empty objects as JSON text.
fn object(v: &Value) -> Option<String> {
    match v {
        Value::Object(map) if !map.is_empty() => Some(v.to_string()),
        _ => None,
    }
}

/// Strings are kept as-is; unix seconds become RFC 3339.
fn timestamp(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
            DateTime::<Utc>::from_timestamp(whole, nanos).map(|t| t.to_rfc3339())
        }
        _ => None,
    }
}
