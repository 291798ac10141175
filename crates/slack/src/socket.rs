use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::{
    parse_events_api_payload, EventContext, EventDispatcher, HandlerResult, SlackEnvelope,
    SlackEvent,
};
use crate::web::{MessagePoster, SlackWebClient};

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
pub enum TransportEvent {
    Envelope(SlackEnvelope),
    /// Slack asked for a new connection, or the peer closed the socket.
    Reconnect,
    Closed,
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_event(&self) -> Result<TransportEvent, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a websocket opened from `apps.connections.open`.
pub struct WebSocketTransport {
    client: Arc<SlackWebClient>,
    sink: Mutex<Option<SplitSink<WsStream, WsMessage>>>,
    source: Mutex<Option<SplitStream<WsStream>>>,
}

impl WebSocketTransport {
    pub fn new(client: Arc<SlackWebClient>) -> Self {
        Self { client, sink: Mutex::new(None), source: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .client
            .open_socket_url()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _response) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);
        *self.source.lock().await = Some(source);
        Ok(())
    }

    async fn next_event(&self) -> Result<TransportEvent, TransportError> {
        let mut guard = self.source.lock().await;
        let Some(source) = guard.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        loop {
            let Some(message) = source.next().await else {
                return Ok(TransportEvent::Reconnect);
            };
            if let Some(event) = frame_event(message) {
                return Ok(event);
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        sink.send(WsMessage::Text(ack.into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.source.lock().await.take();
        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };
        sink.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SocketFrame {
    Hello,
    Disconnect { reason: Option<String> },
    Envelope(SlackEnvelope),
    Closed,
    Control,
}

#[derive(Debug, Deserialize)]
struct RawSocketFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
}

/// Maps one websocket read onto a runner event. `None` means keep reading.
fn frame_event(message: Result<WsMessage, WsError>) -> Option<TransportEvent> {
    let message = match message {
        Ok(message) => message,
        Err(error) => {
            warn!(
                event_name = "ingress.slack.read_failed",
                error = %error,
                "socket read failed; requesting a new connection"
            );
            return Some(TransportEvent::Reconnect);
        }
    };

    match parse_socket_frame(message) {
        Ok(SocketFrame::Envelope(envelope)) => Some(TransportEvent::Envelope(envelope)),
        Ok(SocketFrame::Disconnect { reason }) => {
            info!(
                event_name = "ingress.slack.disconnect_requested",
                reason = reason.as_deref().unwrap_or("unspecified"),
                "slack requested socket reconnect"
            );
            Some(TransportEvent::Reconnect)
        }
        Ok(SocketFrame::Closed) => Some(TransportEvent::Reconnect),
        Ok(SocketFrame::Hello) => {
            debug!("slack socket mode hello received");
            None
        }
        Ok(SocketFrame::Control) => None,
        Err(error) => {
            warn!(
                event_name = "ingress.slack.frame_invalid",
                error = %error,
                "skipping unreadable socket frame"
            );
            None
        }
    }
}

fn parse_socket_frame(message: WsMessage) -> Result<SocketFrame, TransportError> {
    let text = match message {
        WsMessage::Text(text) => text.as_str().to_owned(),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|_| TransportError::Receive("invalid utf-8 socket payload".to_owned()))?,
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
            return Ok(SocketFrame::Control)
        }
        WsMessage::Close(_) => return Ok(SocketFrame::Closed),
    };

    let frame = serde_json::from_str::<RawSocketFrame>(&text)
        .map_err(|error| TransportError::Receive(format!("invalid socket frame: {error}")))?;

    match frame.frame_type.as_str() {
        "hello" => Ok(SocketFrame::Hello),
        "disconnect" => Ok(SocketFrame::Disconnect { reason: frame.reason }),
        frame_type => {
            let Some(envelope_id) = frame.envelope_id else {
                return Ok(SocketFrame::Control);
            };
            let event = match (frame_type, frame.payload.as_ref()) {
                ("events_api", Some(payload)) => parse_events_api_payload(payload),
                _ => SlackEvent::Unsupported { event_type: frame_type.to_owned() },
            };
            Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id, event }))
        }
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    poster: Option<Arc<dyn MessagePoster>>,
}

impl SocketModeRunner {
    pub fn new(transport: Arc<dyn SocketTransport>, dispatcher: EventDispatcher) -> Self {
        Self { transport, dispatcher, poster: None }
    }

    /// Posts `HandlerResult::Responded` messages into the originating thread.
    pub fn with_poster(mut self, poster: Arc<dyn MessagePoster>) -> Self {
        self.poster = Some(poster);
        self
    }

    /// Runs until the transport closes. A read failure opens a new connection;
    /// a failed connection attempt ends the run.
    pub async fn start(&self) -> Result<()> {
        let mut connection = 0_u32;
        self.open(connection).await?;

        loop {
            let event = match self.transport.next_event().await {
                Ok(event) => event,
                Err(error) => {
                    warn!(
                        event_name = "ingress.slack.read_failed",
                        connection,
                        error = %error,
                        "socket read failed; reconnecting"
                    );
                    TransportEvent::Reconnect
                }
            };
            match event {
                TransportEvent::Envelope(envelope) => self.handle_envelope(envelope).await,
                TransportEvent::Reconnect => {
                    connection += 1;
                    if let Err(error) = self.transport.disconnect().await {
                        debug!(error = %error, "ignoring disconnect failure before reconnect");
                    }
                    self.open(connection).await?;
                }
                TransportEvent::Closed => {
                    info!(connection, "socket mode transport stream closed");
                    self.transport.disconnect().await?;
                    return Ok(());
                }
            }
        }
    }

    async fn open(&self, connection: u32) -> Result<(), TransportError> {
        info!(connection, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(connection, "socket mode transport connected");
        Ok(())
    }

    async fn handle_envelope(&self, envelope: SlackEnvelope) {
        let thread_id = envelope.event.reply_target().map(|(_, thread)| thread.to_owned());
        let thread_id = thread_id.as_deref().unwrap_or("unknown");

        info!(
            event_name = "ingress.slack.envelope_received",
            envelope_id = %envelope.envelope_id,
            event_type = ?envelope.event.event_type(),
            correlation_id = %envelope.envelope_id,
            thread_id,
            "received slack envelope"
        );

        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
            warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                thread_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                thread_id,
                "acknowledged slack envelope"
            );
        }

        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        let result = match self.dispatcher.dispatch(&envelope, &context).await {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    thread_id,
                    error = %error,
                    "event dispatch failed; continuing socket loop"
                );
                return;
            }
        };

        let HandlerResult::Responded(message) = result else {
            return;
        };
        let (Some(poster), Some((channel, thread_ts))) =
            (&self.poster, envelope.event.reply_target())
        else {
            debug!(correlation_id = %envelope.envelope_id, "no poster for handler response");
            return;
        };
        if let Err(error) = poster.post_message(channel, Some(thread_ts), &message).await {
            warn!(
                event_name = "egress.slack.post_failed",
                correlation_id = %envelope.envelope_id,
                thread_id,
                error = %error,
                "failed to post handler response"
            );
        }
    }
}
