//! The single websocket connection to the chat server.

use crate::error::ClientError;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parlor_core::{ChatEnvelope, decode, decode_bytes, encode_envelope};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A freshly dialed connection, before it is split into reader and writer.
#[allow(missing_debug_implementations)] // wraps a websocket stream
pub struct Connection {
    stream: WsStream,
}

/// Read half. Owned by exactly one inbound loop.
#[allow(missing_debug_implementations)]
pub struct FrameReader {
    stream: SplitStream<WsStream>,
}

/// Write half. Cheap to clone; every clone writes through the same lock,
/// so frames leave in call order and are never interleaved.
#[derive(Clone)]
pub struct FrameWriter {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Make exactly one connection attempt, optionally bounded by `timeout`.
    pub async fn dial(url: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        debug!(url, "dialing chat server");

        let attempt = connect_async(url);
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_elapsed| {
                ClientError::ConnectTimeout {
                    url: url.to_owned(),
                    timeout: limit,
                }
            })?,
            None => attempt.await,
        };

        let (stream, response) = result.map_err(|source| ClientError::Connect {
            url: url.to_owned(),
            source: Box::new(source),
        })?;
        debug!(url, status = %response.status(), "websocket established");

        Ok(Self { stream })
    }

    /// Announce the local identity.
    ///
    /// The server expects the very first frame to be the bare nick as plain
    /// text, not an envelope.
    pub async fn handshake(&mut self, identity: &str) -> Result<(), ClientError> {
        self.stream
            .send(Message::text(identity.to_owned()))
            .await
            .map_err(|error| ClientError::Handshake(Box::new(error)))?;
        debug!(identity, "identity announced");
        Ok(())
    }

    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (sink, stream) = self.stream.split();
        (
            FrameReader { stream },
            FrameWriter {
                sink: Arc::new(Mutex::new(sink)),
                closed: Arc::new(AtomicBool::new(false)),
            },
        )
    }
}

impl FrameReader {
    /// Wait for the next envelope.
    ///
    /// Control frames are skipped. A close frame or the end of the stream is
    /// [`ClientError::ConnectionClosed`]; a frame that is not an envelope is
    /// [`ClientError::Codec`].
    pub async fn recv(&mut self) -> Result<ChatEnvelope, ClientError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed))
                | None => return Err(ClientError::ConnectionClosed),
                Some(Err(error)) => return Err(ClientError::Read(Box::new(error))),
            };

            match message {
                Message::Text(text) => {
                    trace!(len = text.len(), "text frame received");
                    return decode(text.as_str()).map_err(ClientError::from);
                }
                Message::Binary(bytes) => {
                    trace!(len = bytes.len(), "binary frame received");
                    return decode_bytes(&bytes).map_err(ClientError::from);
                }
                Message::Close(frame) => {
                    debug!(?frame, "server sent close frame");
                    return Err(ClientError::ConnectionClosed);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

impl FrameWriter {
    /// Encode and write one envelope as a single text frame.
    pub async fn send(&self, envelope: &ChatEnvelope) -> Result<(), ClientError> {
        let frame = encode_envelope(envelope)?;
        self.send_text(frame).await
    }

    pub async fn send_text(&self, frame: String) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::text(frame))
            .await
            .map_err(|error| ClientError::Write(Box::new(error)))
    }

    /// Send a close frame and stop accepting writes. Safe to call repeatedly
    /// and after the connection has already failed.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut sink = self.sink.lock().await;
        if let Err(error) = sink.close().await {
            debug!(error = %error, "error while closing websocket");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
