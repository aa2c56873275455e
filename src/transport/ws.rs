//! WebSocket transport over tokio-tungstenite.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::{Closure, SessionError};
use crate::transport::{Connector, Transport};

/// Close frame without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens [`WsTransport`]s with a bounded handshake.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, SessionError> {
        let (ws, _resp) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| SessionError::Connect {
                reason: format!("handshake timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| SessionError::Connect {
                reason: e.to_string(),
            })?;
        Ok(Box::new(WsTransport::new(ws)))
    }
}

/// A live websocket connection.
pub struct WsTransport {
    ws: WsStream,
    /// Text frames read while waiting for a pong.
    pending: VecDeque<String>,
    ping_seq: u64,
}

impl WsTransport {
    fn new(ws: WsStream) -> Self {
        Self {
            ws,
            pending: VecDeque::new(),
            ping_seq: 0,
        }
    }

    /// Reads one frame, mapping stream end and close frames to closures.
    async fn next_frame(&mut self) -> Result<Message, SessionError> {
        match self.ws.next().await {
            None => Err(SessionError::Closed(Closure::abnormal())),
            Some(Err(e)) => Err(map_ws_error(e)),
            Some(Ok(Message::Close(frame))) => {
                let closure = match frame {
                    Some(f) => Closure::new(f.code.into(), f.reason.to_string()),
                    None => Closure::new(CLOSE_NO_STATUS, ""),
                };
                Err(SessionError::Closed(closure))
            }
            Some(Ok(msg)) => Ok(msg),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(map_ws_error)
    }

    async fn recv(&mut self) -> Result<String, SessionError> {
        if let Some(text) = self.pending.pop_front() {
            return Ok(text);
        }
        loop {
            match self.next_frame().await? {
                Message::Text(t) => return Ok(t.as_str().to_owned()),
                other => debug!(kind = frame_kind(&other), "skipping non-text frame"),
            }
        }
    }

    async fn ping(&mut self) -> Result<(), SessionError> {
        self.ping_seq = self.ping_seq.wrapping_add(1);
        let payload = self.ping_seq.to_be_bytes().to_vec();
        self.ws
            .send(Message::Ping(payload.clone().into()))
            .await
            .map_err(map_ws_error)?;

        loop {
            match self.next_frame().await? {
                Message::Pong(p) if p.as_ref() == payload.as_slice() => return Ok(()),
                Message::Text(t) => self.pending.push_back(t.as_str().to_owned()),
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "close handshake failed");
        }
    }
}

fn map_ws_error(e: tungstenite::Error) -> SessionError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            SessionError::Closed(Closure::abnormal())
        }
        tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => SessionError::Closed(Closure::abnormal()),
        other => SessionError::Io {
            reason: other.to_string(),
        },
    }
}

fn frame_kind(msg: &Message) -> &'static str {
    match msg {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}
