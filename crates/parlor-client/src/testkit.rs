//! In-process chat server for tests.
//!
//! Speaks the server side of the wire contract: reads the bare identity
//! frame, then exchanges JSON envelopes. Tests drive it explicitly, so it
//! never broadcasts or echoes on its own.

use futures::{SinkExt, StreamExt};
use parlor_core::{ChatEnvelope, EnvelopeKind, decode, encode_contact_list, encode_envelope};
use std::time::{Duration, SystemTime};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::debug;

#[allow(missing_debug_implementations)]
pub struct TestServer {
    url: String,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    accept_task: JoinHandle<()>,
}

/// One client as seen from the server, after its identity frame.
#[allow(missing_debug_implementations)]
pub struct ServerConnection {
    nick: String,
    ws: WebSocketStream<TcpStream>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    match ServerConnection::handshake(stream).await {
                        Some(connection) => {
                            let _ = tx.send(connection);
                        }
                        None => debug!(%peer, "test client went away before identifying"),
                    }
                });
            }
        });

        Ok(Self {
            url: format!("ws://{addr}/ws"),
            connections,
            accept_task,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next client that completed the identity handshake.
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl ServerConnection {
    async fn handshake(stream: TcpStream) -> Option<Self> {
        let mut ws = accept_async(stream).await.ok()?;
        let nick = loop {
            match ws.next().await? {
                Ok(Message::Text(text)) => break text.as_str().to_owned(),
                Ok(_) => {}
                Err(_) => return None,
            }
        };
        Some(Self { nick, ws })
    }

    /// The identity the client announced.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Next text frame, or `None` once the client is gone.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    /// Like [`Self::recv_text`] but gives up after `wait`.
    pub async fn recv_text_within(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.recv_text())
            .await
            .ok()
            .flatten()
    }

    pub async fn recv_envelope(&mut self) -> Option<ChatEnvelope> {
        let frame = self.recv_text_within(Duration::from_secs(5)).await?;
        decode(&frame).ok()
    }

    pub async fn send_text(&mut self, frame: &str) -> Result<(), tungstenite::Error> {
        self.ws.send(Message::text(frame.to_owned())).await
    }

    /// Send an envelope as a binary frame.
    pub async fn send_binary_envelope(
        &mut self,
        envelope: &ChatEnvelope,
    ) -> Result<(), tungstenite::Error> {
        let frame = encode_envelope(envelope).unwrap_or_default();
        self.ws.send(Message::binary(frame.into_bytes())).await
    }

    pub async fn send_ping(&mut self, payload: &[u8]) -> Result<(), tungstenite::Error> {
        self.ws.send(Message::Ping(payload.to_vec().into())).await
    }

    pub async fn send_envelope(
        &mut self,
        envelope: &ChatEnvelope,
    ) -> Result<(), tungstenite::Error> {
        let frame = encode_envelope(envelope).unwrap_or_default();
        self.send_text(&frame).await
    }

    pub async fn send_contact_list(&mut self, nicks: &[&str]) -> Result<(), tungstenite::Error> {
        let nicks: Vec<String> = nicks.iter().map(|nick| (*nick).to_owned()).collect();
        self.send_envelope(&ChatEnvelope {
            kind: EnvelopeKind::ContactList,
            msg: encode_contact_list(&nicks).unwrap_or_default(),
            ..ChatEnvelope::default()
        })
        .await
    }

    /// Send a close frame, then drop the connection without waiting for
    /// the client's reply.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    /// Drop the TCP connection without a close frame.
    pub fn abort(self) {
        drop(self.ws);
    }
}

/// A server-stamped chat message.
pub fn chat_message(from: &str, to: &str, body: &str) -> ChatEnvelope {
    ChatEnvelope {
        kind: EnvelopeKind::Message,
        nick: from.to_owned(),
        to: to.to_owned(),
        msg: body.to_owned(),
        timestamp: Some(SystemTime::now().into()),
    }
}

/// An `add_contact` push, with the nick in `to` as servers send it.
pub fn contact_added(nick: &str) -> ChatEnvelope {
    ChatEnvelope {
        kind: EnvelopeKind::AddContact,
        to: nick.to_owned(),
        ..ChatEnvelope::default()
    }
}
