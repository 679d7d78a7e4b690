//! Push and REST transport layers.
//!
//! The engine consumes both transports through traits so the session
//! manager, pull fallback, and coordinator can be exercised against
//! in-memory fakes. The production implementations are a
//! `tokio-tungstenite` WebSocket client and a `reqwest` HTTP client.

use crate::config::{AuthConfig, ClientConfig, ConfigError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reviewroom_api::types::{ApiErrorBody, MarkSubmission, ReviewsQuery, ReviewsResponse};
use reviewroom_api::{ClientMessage, ServerEvent};
use reviewroom_core::{ReviewSnapshot, SyncError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Capacity for the inbound event buffer of one push connection.
const INBOUND_BUFFER: usize = 64;

/// Raw signal from an established push connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A decoded server event frame.
    Event(ServerEvent),
    /// The channel is gone; the session manager decides whether to
    /// reconnect.
    Closed { reason: String },
}

/// Live push connection handle: outbound message sink plus inbound event
/// stream. Dropping the outbound sender closes the connection.
pub struct PushConnection {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Persistent bidirectional push channel, connected once per session
/// attempt.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<PushConnection, SyncError>;
}

/// REST transport for the pull fallback and out-of-band submissions.
#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn fetch_reviews(&self, query: &ReviewsQuery) -> Result<ReviewSnapshot, SyncError>;
    async fn submit_marks(&self, submission: &MarkSubmission) -> Result<(), SyncError>;
}

// ----------------------------------------------------------------------------
// WebSocket push transport
// ----------------------------------------------------------------------------

/// `tokio-tungstenite` push transport.
pub struct WsTransport {
    endpoint: String,
    auth_header: HeaderMap,
}

impl WsTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: config.ws_endpoint.clone(),
            auth_header: build_auth_headers(&config.auth)?,
        })
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<PushConnection, SyncError> {
        let mut request = Request::builder()
            .uri(self.endpoint.clone())
            .body(())
            .map_err(|e| SyncError::Connection {
                reason: e.to_string(),
            })?;
        let headers = request.headers_mut();
        for (name, value) in self.auth_header.iter() {
            headers.insert(name, value.clone());
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SyncError::Connection {
                reason: e.to_string(),
            })?;
        debug!(endpoint = %self.endpoint, "push channel established");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(INBOUND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(INBOUND_BUFFER);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(error = %err, "failed to encode outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if inbound_tx
                                    .send(TransportEvent::Event(event))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "failed to decode server event frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break "server closed the connection".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break err.to_string(),
                    None => break "connection closed".to_string(),
                }
            };
            let _ = inbound_tx.send(TransportEvent::Closed { reason }).await;
        });

        Ok(PushConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

// ----------------------------------------------------------------------------
// REST transport
// ----------------------------------------------------------------------------

/// `reqwest` REST transport with auth headers and structured error
/// parsing.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
    request_timeout_ms: u64,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header: build_auth_headers(&config.auth)?,
            request_timeout_ms: config.request_timeout_ms,
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::RequestTimeout {
                timeout_ms: self.request_timeout_ms,
            }
        } else {
            SyncError::RequestFailed {
                reason: err.to_string(),
            }
        }
    }

    /// Read the structured error body from a non-2xx response.
    async fn error_reason(response: reqwest::Response) -> String {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&text) {
            format!("{}: {}", body.code, body.message)
        } else {
            format!("HTTP {}: {}", status.as_u16(), text)
        }
    }
}

#[async_trait]
impl RestTransport for RestClient {
    async fn fetch_reviews(&self, query: &ReviewsQuery) -> Result<ReviewSnapshot, SyncError> {
        let url = format!("{}/api/v1/reviews", self.base_url);
        let response = self
            .client
            .get(url)
            .headers(self.auth_header.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if response.status().is_success() {
            let body: ReviewsResponse = response
                .json()
                .await
                .map_err(|e| self.map_transport_error(e))?;
            Ok(body.into())
        } else {
            Err(SyncError::RequestFailed {
                reason: Self::error_reason(response).await,
            })
        }
    }

    async fn submit_marks(&self, submission: &MarkSubmission) -> Result<(), SyncError> {
        let url = format!("{}/api/v1/marks", self.base_url);
        let response = self
            .client
            .post(url)
            .headers(self.auth_header.clone())
            .json(submission)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::SubmissionRejected {
                reason: Self::error_reason(response).await,
            })
        }
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| ConfigError::InvalidValue {
                field: "auth.api_key",
                reason: e.to_string(),
            })?,
        );
    }
    if let Some(token) = &auth.bearer_token {
        let value = format!("Bearer {}", token);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ConfigError::InvalidValue {
                field: "auth.bearer_token",
                reason: e.to_string(),
            })?,
        );
    }
    Ok(headers)
}
