//! Scripted collaborators for runtime tests.
//!
//! - [`ScriptedLookup`] resolves every name to session `12345` unless told otherwise.
//! - [`ScriptedConnector`] hands out one [`Dial`] per `connect`; once the queue is
//!   empty it keeps repeating its fallback dial (refusal by default).
//! - [`FakeTransport`] plays back [`Step`]s and records what the session sent.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::channel::ChannelName;
use crate::error::{Closure, LookupError, SessionError};
use crate::lookup::{ChannelLookup, ResolvedChannel};
use crate::transport::{Connector, Transport};

pub const SESSION_ID: &str = "12345";

pub struct ScriptedLookup {
    failures: Mutex<HashMap<String, LookupError>>,
    pub calls: AtomicU32,
}

impl ScriptedLookup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn fail(&self, channel: &str, err: LookupError) {
        self.failures.lock().insert(channel.to_string(), err);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelLookup for ScriptedLookup {
    async fn resolve(&self, channel: &ChannelName) -> Result<ResolvedChannel, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().get(channel.as_str()) {
            return Err(err.clone());
        }
        Ok(ResolvedChannel {
            session_id: SESSION_ID.to_string(),
            metadata: json!({ "chatroom": { "id": 12345 } }),
        })
    }
}

/// One scripted inbound step.
#[derive(Clone, Debug)]
pub enum Step {
    /// A text frame.
    Text(String),
    /// The peer closes with this code.
    Close(u16),
    /// Nothing ever arrives again.
    Hang,
}

/// What one `connect` call produces.
#[derive(Clone, Debug)]
pub enum Dial {
    Refuse,
    Open { steps: Vec<Step>, pong: bool },
}

impl Dial {
    pub fn open(steps: Vec<Step>) -> Self {
        Dial::Open { steps, pong: true }
    }

    /// Connection whose pings are never answered.
    pub fn deaf(steps: Vec<Step>) -> Self {
        Dial::Open { steps, pong: false }
    }
}

pub struct ScriptedConnector {
    dials: Mutex<VecDeque<Dial>>,
    fallback: Dial,
    pub connects: AtomicU32,
    pub closes: Arc<AtomicU32>,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new(dials: Vec<Dial>) -> Arc<Self> {
        Self::with_fallback(dials, Dial::Refuse)
    }

    pub fn with_fallback(dials: Vec<Dial>, fallback: Dial) -> Arc<Self> {
        Arc::new(Self {
            dials: Mutex::new(dials.into()),
            fallback,
            connects: AtomicU32::new(0),
            closes: Arc::new(AtomicU32::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let dial = self
            .dials
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match dial {
            Dial::Refuse => Err(SessionError::Connect {
                reason: "connection refused".to_string(),
            }),
            Dial::Open { steps, pong } => Ok(Box::new(FakeTransport {
                steps: steps.into(),
                pong,
                sent: Arc::clone(&self.sent),
                closes: Arc::clone(&self.closes),
            })),
        }
    }
}

pub struct FakeTransport {
    steps: VecDeque<Step>,
    pong: bool,
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicU32>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, SessionError> {
        match self.steps.pop_front() {
            Some(Step::Text(t)) => Ok(t),
            Some(Step::Close(code)) => {
                self.steps.push_front(Step::Close(code));
                Err(SessionError::Closed(Closure::new(code, "scripted")))
            }
            Some(Step::Hang) | None => std::future::pending().await,
        }
    }

    async fn ping(&mut self) -> Result<(), SessionError> {
        if self.pong {
            Ok(())
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wire frame with `data` double-encoded, as the upstream sends it.
pub fn frame(event: &str, data: Value) -> String {
    json!({
        "event": event,
        "data": data.to_string(),
        "channel": format!("chatrooms.{SESSION_ID}.v2"),
    })
    .to_string()
}

pub fn chat_frame(user: u64, text: &str) -> String {
    frame(
        r"App\Events\ChatMessageEvent",
        json!({
            "id": format!("msg-{user}-{text}"),
            "chatroom_id": 12345,
            "content": text,
            "type": "message",
            "created_at": "2025-01-01T00:00:00+00:00",
            "sender": { "id": user, "username": format!("user{user}") }
        }),
    )
}

pub fn ack_frame() -> String {
    json!({
        "event": "pusher:connection_established",
        "data": "{\"socket_id\":\"1.2\",\"activity_timeout\":120}"
    })
    .to_string()
}
