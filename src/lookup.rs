//! # Channel lookup.
//!
//! Resolves a channel name into the session identifier its topic is addressed by.
//!
//! ```text
//! GET <base_url><name>
//!   200 → {"chatroom": {"id": 668, ...}, ...}  → ResolvedChannel{ session_id: "668", metadata }
//!   403 → Blocked      404 → NotFound      other → UnexpectedStatus
//!   timeout → Timeout  bad JSON / no id → InvalidResponse
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::channel::ChannelName;
use crate::error::LookupError;

/// Successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannel {
    /// Identifier used in the subscribe topic.
    pub session_id: String,
    /// Full lookup document.
    pub metadata: Value,
}

/// Resolves channel names.
#[async_trait]
pub trait ChannelLookup: Send + Sync + 'static {
    async fn resolve(&self, channel: &ChannelName) -> Result<ResolvedChannel, LookupError>;
}

/// HTTP implementation backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLookup {
    /// Creates a lookup against `base_url` (the channel name is appended).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("roomvisor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookupError::Transport {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ChannelLookup for HttpLookup {
    async fn resolve(&self, channel: &ChannelName) -> Result<ResolvedChannel, LookupError> {
        let url = format!("{}{}", self.base_url, channel.as_str());
        debug!(channel = %channel, %url, "resolving channel");

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match resp.status().as_u16() {
            200 => {}
            403 => {
                return Err(LookupError::Blocked {
                    channel: channel.to_string(),
                });
            }
            404 => {
                return Err(LookupError::NotFound {
                    channel: channel.to_string(),
                });
            }
            status => return Err(LookupError::UnexpectedStatus { status }),
        }

        let body = resp.text().await.map_err(map_reqwest_error)?;
        parse_document(&body)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Transport {
            reason: e.to_string(),
        }
    }
}

/// Parses a lookup document and extracts `chatroom.id`.
pub fn parse_document(body: &str) -> Result<ResolvedChannel, LookupError> {
    let metadata: Value =
        serde_json::from_str(body).map_err(|e| LookupError::InvalidResponse {
            reason: e.to_string(),
        })?;
    let session_id = match metadata.pointer("/chatroom/id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(LookupError::InvalidResponse {
                reason: "missing chatroom.id".to_string(),
            });
        }
    };
    Ok(ResolvedChannel {
        session_id,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn name(s: &str) -> ChannelName {
        ChannelName::new(s).unwrap()
    }

    async fn lookup_for(server: &MockServer) -> HttpLookup {
        HttpLookup::new(format!("{}/api/v2/channels/", server.uri()), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_numeric_and_string_ids() {
        let r = parse_document(r#"{"chatroom":{"id":12345}}"#).unwrap();
        assert_eq!(r.session_id, "12345");
        let r = parse_document(r#"{"chatroom":{"id":"777"}}"#).unwrap();
        assert_eq!(r.session_id, "777");
    }

    #[test]
    fn test_missing_id_is_invalid() {
        assert!(matches!(
            parse_document(r#"{"chatroom":{}}"#),
            Err(LookupError::InvalidResponse { .. })
        ));
        assert!(matches!(
            parse_document("<html>"),
            Err(LookupError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/channels/xqc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "slug": "xqc",
                "chatroom": { "id": 668 }
            })))
            .mount(&server)
            .await;

        let r = lookup_for(&server).await.resolve(&name("xQc")).await.unwrap();
        assert_eq!(r.session_id, "668");
        assert_eq!(r.metadata["slug"], "xqc");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/api/v2/channels/blocked"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(path("/api/v2/channels/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/api/v2/channels/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let lookup = lookup_for(&server).await;
        assert!(matches!(
            lookup.resolve(&name("blocked")).await,
            Err(LookupError::Blocked { .. })
        ));
        assert!(matches!(
            lookup.resolve(&name("ghost")).await,
            Err(LookupError::NotFound { .. })
        ));
        assert_eq!(
            lookup.resolve(&name("broken")).await,
            Err(LookupError::UnexpectedStatus { status: 500 })
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/api/v2/channels/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let lookup =
            HttpLookup::new(format!("{}/api/v2/channels/", server.uri()), Duration::from_millis(200))
                .unwrap();
        assert_eq!(lookup.resolve(&name("slow")).await, Err(LookupError::Timeout));
    }
}
