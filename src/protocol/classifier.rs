//! # Message classifier.
//!
//! Every decoded [`Envelope`] lands in exactly one bucket:
//!
//! ```text
//! event name ──► ignored set?  ──yes──► Ignored    (dropped)
//!            └─► handled kind? ──yes──► Handled    (StructuredEvent → storage)
//!            └─► otherwise ───────────► Unhandled  (raw frame → overflow log)
//! ```
//!
//! Handled kinds are a closed enum; names from `Config::extra_handled_events`
//! map to [`MessageKind::Generic`] and are stored with generic row preparation.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::protocol::Envelope;

/// Protocol housekeeping and poll events, dropped silently.
pub const DEFAULT_IGNORED_EVENTS: &[&str] = &[
    "pusher:connection_established",
    "pusher_internal:subscription_succeeded",
    r"App\Events\PollUpdateEvent",
    r"App\Events\PollDeleteEvent",
];

/// Known chat event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ChatMessage,
    Subscription,
    UserBanned,
    UserUnbanned,
    MessageDeleted,
    PinnedMessageCreated,
    ChatMessageSent,
    ChatroomUpdated,
    StreamHost,
    PinnedMessageDeleted,
    ChatroomClear,
    /// Handled by configuration, without a dedicated row shape.
    Generic(Arc<str>),
}

impl MessageKind {
    /// All kinds with a dedicated variant.
    pub const KNOWN: [MessageKind; 11] = [
        MessageKind::ChatMessage,
        MessageKind::Subscription,
        MessageKind::UserBanned,
        MessageKind::UserUnbanned,
        MessageKind::MessageDeleted,
        MessageKind::PinnedMessageCreated,
        MessageKind::ChatMessageSent,
        MessageKind::ChatroomUpdated,
        MessageKind::StreamHost,
        MessageKind::PinnedMessageDeleted,
        MessageKind::ChatroomClear,
    ];

    /// Maps a wire event name to a dedicated kind.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            r"App\Events\ChatMessageEvent" => MessageKind::ChatMessage,
            r"App\Events\SubscriptionEvent" => MessageKind::Subscription,
            r"App\Events\UserBannedEvent" => MessageKind::UserBanned,
            r"App\Events\UserUnbannedEvent" => MessageKind::UserUnbanned,
            r"App\Events\MessageDeletedEvent" => MessageKind::MessageDeleted,
            r"App\Events\PinnedMessageCreatedEvent" => MessageKind::PinnedMessageCreated,
            r"App\Events\ChatMessageSentEvent" => MessageKind::ChatMessageSent,
            r"App\Events\ChatroomUpdatedEvent" => MessageKind::ChatroomUpdated,
            r"App\Events\StreamHostEvent" => MessageKind::StreamHost,
            r"App\Events\PinnedMessageDeletedEvent" => MessageKind::PinnedMessageDeleted,
            r"App\Events\ChatroomClearEvent" => MessageKind::ChatroomClear,
            _ => return None,
        };
        Some(kind)
    }

    /// Wire event name.
    pub fn as_name(&self) -> &str {
        match self {
            MessageKind::ChatMessage => r"App\Events\ChatMessageEvent",
            MessageKind::Subscription => r"App\Events\SubscriptionEvent",
            MessageKind::UserBanned => r"App\Events\UserBannedEvent",
            MessageKind::UserUnbanned => r"App\Events\UserUnbannedEvent",
            MessageKind::MessageDeleted => r"App\Events\MessageDeletedEvent",
            MessageKind::PinnedMessageCreated => r"App\Events\PinnedMessageCreatedEvent",
            MessageKind::ChatMessageSent => r"App\Events\ChatMessageSentEvent",
            MessageKind::ChatroomUpdated => r"App\Events\ChatroomUpdatedEvent",
            MessageKind::StreamHost => r"App\Events\StreamHostEvent",
            MessageKind::PinnedMessageDeleted => r"App\Events\PinnedMessageDeletedEvent",
            MessageKind::ChatroomClear => r"App\Events\ChatroomClearEvent",
            MessageKind::Generic(name) => name,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

/// A handled message, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredEvent {
    pub kind: MessageKind,
    /// Decoded payload.
    pub fields: Value,
}

/// Outcome of classifying one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Ignored,
    Handled(StructuredEvent),
    Unhandled(Envelope),
}

/// Three-way message classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    ignored: HashSet<String>,
    extra_handled: HashSet<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_IGNORED_EVENTS.iter().map(|s| s.to_string()),
            std::iter::empty(),
        )
    }
}

impl Classifier {
    /// Creates a classifier from the ignored set and extra generic-handled names.
    ///
    /// A name that is both ignored and handled is ignored.
    pub fn new(
        ignored: impl IntoIterator<Item = String>,
        extra_handled: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            ignored: ignored.into_iter().collect(),
            extra_handled: extra_handled.into_iter().collect(),
        }
    }

    /// Classifies one decoded envelope.
    pub fn classify(&self, env: Envelope) -> Classification {
        if self.ignored.contains(&env.event) {
            return Classification::Ignored;
        }
        let kind = match MessageKind::from_name(&env.event) {
            Some(kind) => kind,
            None if self.extra_handled.contains(&env.event) => {
                MessageKind::Generic(Arc::from(env.event.as_str()))
            }
            None => return Classification::Unhandled(env),
        };
        Classification::Handled(StructuredEvent {
            kind,
            fields: env.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(event: &str) -> Envelope {
        Envelope {
            event: event.to_string(),
            data: json!({"id": "1"}),
            channel: None,
            raw: event.to_string(),
        }
    }

    #[test]
    fn test_ignored_events() {
        let c = Classifier::default();
        for name in DEFAULT_IGNORED_EVENTS {
            assert_eq!(c.classify(env(name)), Classification::Ignored);
        }
    }

    #[test]
    fn test_every_known_kind_is_handled() {
        let c = Classifier::default();
        for kind in MessageKind::KNOWN {
            match c.classify(env(kind.as_name())) {
                Classification::Handled(ev) => {
                    assert_eq!(ev.kind, kind);
                    assert_eq!(ev.fields, json!({"id": "1"}));
                }
                other => panic!("{kind} classified as {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_is_unhandled() {
        let c = Classifier::default();
        let e = env(r"App\Events\GiftedSubscriptionsEvent");
        assert_eq!(c.classify(e.clone()), Classification::Unhandled(e));
    }

    #[test]
    fn test_extra_handled_maps_to_generic() {
        let c = Classifier::new(
            Vec::new(),
            vec![r"App\Events\GiftedSubscriptionsEvent".to_string()],
        );
        match c.classify(env(r"App\Events\GiftedSubscriptionsEvent")) {
            Classification::Handled(ev) => assert_eq!(
                ev.kind,
                MessageKind::Generic(Arc::from(r"App\Events\GiftedSubscriptionsEvent"))
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ignored_wins_over_handled() {
        let name = r"App\Events\ChatMessageEvent".to_string();
        let c = Classifier::new(vec![name.clone()], Vec::new());
        assert_eq!(c.classify(env(&name)), Classification::Ignored);
    }
}
