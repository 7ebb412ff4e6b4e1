//! Accepts subscriber connections, decodes client commands, and writes typed server frames.
//!
//! Mirrors the accept/read/write split of a gorilla-websocket-style handler: one reader loop
//! parses `{"op", "args", "depth"}` commands off the socket, while pushes from the hub's
//! dispatch and commit cycle write frames through a [`ConnectionHandle`] that may be cloned and
//! shared with the subscription registry.

use crate::error::SocketError;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};

/// A client → server subscriber command.
///
/// ```json
/// {"op": "subscribe", "args": ["depth:BTC/USD:0.01"], "depth": 20}
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientCommand {
    pub op: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub depth: Option<usize>,
}

/// A server → client frame: `{"type": "<tag>", "payload": <payload>}`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame<'a, T: Serialize> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub payload: &'a T,
}

impl<'a, T: Serialize> ServerFrame<'a, T> {
    pub fn new(kind: &'a str, payload: &'a T) -> Self {
        Self { kind, payload }
    }

    pub fn to_message(&self) -> Result<Message, SocketError> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// The write half of an accepted connection, cloneable and shared between the reader task and
/// every push site (subscription registry discovery, router dispatch, commit cycle).
///
/// Writes are serialised per-connection through the inner mutex, matching the "one write at a
/// time per socket" requirement of the underlying transport.
#[derive(Clone)]
pub struct ConnectionHandle {
    sink: Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>,
}

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

impl ConnectionHandle {
    /// Serialise `payload` as `{"type": kind, "payload": payload}` and write it as one text
    /// frame. On any failure the connection should be considered dead by the caller, which is
    /// expected to deregister it from the subscription registry.
    pub async fn send<T: Serialize>(&self, kind: &str, payload: &T) -> Result<(), SocketError> {
        let frame = ServerFrame::new(kind, payload);
        let message = frame.to_message()?;
        let mut sink = self.sink.lock().await;
        tokio::time::timeout(WRITE_TIMEOUT, sink.send(message))
            .await
            .map_err(|_| SocketError::WriteTimeout)??;
        Ok(())
    }

    /// Writes a pre-serialised text frame as-is. Used by the fan-out delivery step, which
    /// serialises a push payload once and shares the same `Arc<str>` across every subscriber
    /// instead of re-serialising per connection.
    pub async fn send_text(&self, frame: Arc<str>) -> Result<(), SocketError> {
        let mut sink = self.sink.lock().await;
        tokio::time::timeout(WRITE_TIMEOUT, sink.send(Message::Text(frame.to_string().into())))
            .await
            .map_err(|_| SocketError::WriteTimeout)??;
        Ok(())
    }

    pub async fn send_pong(&self, payload: Vec<u8>) -> Result<(), SocketError> {
        let mut sink = self.sink.lock().await;
        tokio::time::timeout(WRITE_TIMEOUT, sink.send(Message::Pong(payload.into())))
            .await
            .map_err(|_| SocketError::WriteTimeout)??;
        Ok(())
    }

    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle").finish_non_exhaustive()
    }
}

/// An accepted, not-yet-upgraded-beyond-handshake subscriber socket.
pub struct WsConnection {
    stream: SplitStreamHalf,
    pub handle: ConnectionHandle,
}

type SplitStreamHalf = futures::stream::SplitStream<WebSocketStream<TcpStream>>;

impl WsConnection {
    /// Performs the websocket upgrade handshake on an accepted TCP stream.
    pub async fn accept(tcp: TcpStream) -> Result<Self, SocketError> {
        let ws = tokio_tungstenite::accept_async(tcp).await?;
        let (sink, stream) = ws.split();
        Ok(Self {
            stream,
            handle: ConnectionHandle {
                sink: Arc::new(Mutex::new(sink)),
            },
        })
    }

    /// Reads the next client command. Ping frames are answered inline (echoing the
    /// application data, matching the upstream server's ping-handler convention) and control
    /// frames are otherwise skipped; `Ok(None)` signals a clean close.
    pub async fn next_command(&mut self) -> Result<Option<ClientCommand>, SocketError> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Err(err)) => return Err(SocketError::WebSocket(err)),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Ping(payload))) => {
                    self.handle.send_pong(payload.to_vec()).await?;
                }
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Text(text))) => {
                    let command = serde_json::from_str(&text)
                        .map_err(|err| SocketError::MalformedCommand(err.to_string()))?;
                    return Ok(Some(command));
                }
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Frame(_))) => {
                    return Err(SocketError::UnsupportedFrame);
                }
            }
        }
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection").finish_non_exhaustive()
    }
}
