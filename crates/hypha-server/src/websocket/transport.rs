//! The per-session transport seam.
//!
//! [`ConnectionManager`](super::ConnectionManager) only talks to sessions
//! through [`Transport`], so tests can drive it without sockets.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Failure on one session's transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// Outbound frame could not be written.
    #[error("send failed: {0}")]
    Send(String),
    /// Inbound frame could not be read.
    #[error("receive failed: {0}")]
    Receive(String),
    /// The peer did not drain the send in time.
    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// The transport is already closed.
    #[error("transport closed")]
    Closed,
    /// Message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A bidirectional message channel to one client.
///
/// Methods take `&self`: sends (broadcasts, heartbeats) and the receive loop
/// run concurrently on the same session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Complete the handshake.
    async fn accept(&self) -> Result<(), TransportError>;

    /// Send one JSON message.
    async fn send_json(&self, message: &Value) -> Result<(), TransportError>;

    /// Next inbound text message, or `None` once the peer has closed.
    async fn receive_text(&self) -> Result<Option<String>, TransportError>;

    /// Close the transport.
    async fn close(&self) -> Result<(), TransportError>;
}

/// [`Transport`] over an upgraded axum `WebSocket`.
///
/// The upgrade has already completed the handshake, so `accept` is a no-op.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
}

impl WsTransport {
    /// Wrap an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn accept(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_json(&self, message: &Value) -> Result<(), TransportError> {
        let text = serde_json::to_string(message)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn receive_text(&self) -> Result<Option<String>, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(bytes))) => {
                    debug!(len = bytes.len(), "ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        // Peer may already be gone; the close frame is best effort.
        let _ = sink.send(Message::Close(None)).await;
        sink.close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
