use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::{
    parse_socket_frame, EventContext, EventDispatcher, SlackEnvelope, SocketFrame,
};
use crate::web::SlackWebClient;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed connections tolerated before the runner gives up.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the server closed the connection or asked for a reconnect.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Slack Socket Mode over a websocket opened with `apps.connections.open`.
pub struct SlackSocketTransport {
    web: Arc<SlackWebClient>,
    app_token: SecretString,
    stream: Mutex<Option<SocketStream>>,
}

impl SlackSocketTransport {
    pub fn new(web: Arc<SlackWebClient>, app_token: SecretString) -> Self {
        Self { web, app_token, stream: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for SlackSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .web
            .open_socket_url(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _) =
            connect_async(url.as_str()).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        while let Some(message) = stream.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => continue,
                Err(error) => return Err(TransportError::Receive(error.to_string())),
            };

            match parse_socket_frame(&text) {
                Ok(SocketFrame::Envelope(envelope)) => return Ok(Some(envelope)),
                Ok(SocketFrame::Disconnect { reason }) => {
                    info!(reason = %reason, "slack requested socket reconnect");
                    return Ok(None);
                }
                Ok(SocketFrame::Hello) => debug!("socket mode hello received"),
                Ok(SocketFrame::Ignored { frame_type }) => {
                    debug!(frame_type = %frame_type, "ignoring socket frame")
                }
                Err(error) => warn!(error = %error, "dropping undecodable socket frame"),
            }
        }
        Ok(None)
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };
        stream
            .send(Message::text(json!({ "envelope_id": envelope_id }).to_string()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        match stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(error) => Err(TransportError::Disconnect(error.to_string())),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PumpEnd {
    Closed { delivered: usize },
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Pumps envelopes until `shutdown` flips or reconnects are exhausted.
    ///
    /// A connection that closes after delivering events is reopened at once; one that
    /// fails or closes empty counts toward `max_retries`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut failures = 0_u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pumped = tokio::select! {
                pumped = self.connect_and_pump(failures) => pumped,
                _ = shutdown.changed() => break,
            };

            let failure = match pumped {
                Ok(PumpEnd::Closed { delivered }) if delivered > 0 => {
                    failures = 0;
                    info!(delivered, "socket mode connection closed; reconnecting");
                    continue;
                }
                Ok(PumpEnd::Closed { .. }) => "connection closed before delivering any event".to_owned(),
                Err(transport_error) => transport_error.to_string(),
            };

            warn!(
                attempt = failures,
                max_retries = self.reconnect_policy.max_retries,
                error = %failure,
                "socket mode transport failed"
            );
            if failures >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing process without crash"
                );
                break;
            }

            let delay = self.reconnect_policy.backoff(failures);
            failures += 1;
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        if let Err(error) = self.transport.disconnect().await {
            warn!(error = %error, "socket mode transport did not close cleanly");
        }
        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<PumpEnd, TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode transport connected");

        let mut delivered = 0;
        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(PumpEnd::Closed { delivered });
            };
            delivered += 1;
            let (chat_ref, message_ref) =
                envelope.event.message_coordinates().unwrap_or(("unknown", "unknown"));

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                chat_ref,
                message_ref,
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
                warn!(
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    chat_ref,
                    message_ref,
                    error = %error,
                    "event dispatch failed; continuing socket loop"
                );
            }
        }
    }
}
