//! Session facade: the API the presentation layer talks to.

use crate::connection::{Connection, FrameReader, FrameWriter};
use crate::error::ClientError;
use crate::inbound::InboundLoop;
use crate::reconnect::ReconnectPolicy;
use parlor_core::{
    CloseReason, ConnectionState, EventBus, EventStream, Intent, Roster, SessionEvent,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub identity: String,
    pub connect_timeout: Option<Duration>,
    /// `None` keeps the session terminal once the connection drops.
    pub reconnect: Option<ReconnectPolicy>,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            identity: identity.into(),
            connect_timeout: None,
            reconnect: None,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }
}

/// State shared between the facade and the supervisor task.
#[derive(Debug)]
struct Shared {
    config: SessionConfig,
    writer: Mutex<Option<FrameWriter>>,
    roster: Arc<Roster>,
    bus: Arc<EventBus>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl Shared {
    fn writer(&self) -> Option<FrameWriter> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install_writer(&self, writer: FrameWriter) {
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer);
    }

    fn take_writer(&self) -> Option<FrameWriter> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            // Closed is terminal.
            if current.is_closed() || *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "connection state changed");
            *current = next;
            true
        });
    }

    /// Enter Closed and publish `SessionClosed`, once.
    fn finish(&self, reason: CloseReason) {
        let previous = self.state.send_replace(ConnectionState::Closed);
        if previous.is_closed() {
            return;
        }
        info!(reason = %reason, "session closed");
        self.bus.publish(&SessionEvent::SessionClosed { reason });
    }

    async fn request_roster(&self, writer: &FrameWriter) -> Result<(), ClientError> {
        let envelope = Intent::RequestRoster {
            identity: self.config.identity.clone(),
        }
        .into_envelope();
        writer.send(&envelope).await
    }
}

/// Dial, announce the identity and split the connection.
async fn establish(config: &SessionConfig) -> Result<(FrameReader, FrameWriter), ClientError> {
    let mut connection = Connection::dial(&config.url, config.connect_timeout).await?;
    connection.handshake(&config.identity).await?;
    Ok(connection.into_split())
}

/// A single chat session over one logical connection.
///
/// Owns the connection, the roster and the subscriber list. The inbound
/// reader runs on its own task for as long as the session is open.
#[derive(Debug)]
pub struct Session {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Dial the server once, send the identity frame and start reading.
    ///
    /// A failed dial is returned as-is; nothing is retried here.
    pub async fn connect(config: SessionConfig) -> Result<Self, ClientError> {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let bus = Arc::new(EventBus::new());
        let roster = Arc::new(Roster::new(Arc::clone(&bus)));

        let (reader, writer) = establish(&config).await?;
        info!(url = %config.url, identity = %config.identity, "connected to chat server");

        let shared = Arc::new(Shared {
            config,
            writer: Mutex::new(Some(writer)),
            roster,
            bus,
            state,
            shutdown: CancellationToken::new(),
        });
        shared.set_state(ConnectionState::Open);

        let span = info_span!("session", identity = %shared.config.identity);
        let supervisor = tokio::spawn(supervise(Arc::clone(&shared), reader).instrument(span));

        Ok(Self {
            shared,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    pub fn identity(&self) -> &str {
        &self.shared.config.identity
    }

    pub fn url(&self) -> &str {
        &self.shared.config.url
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Register a subscriber for chat, roster and lifecycle events.
    pub fn subscribe(&self) -> EventStream {
        self.shared.bus.subscribe()
    }

    /// Current contacts in insertion order.
    pub fn roster(&self) -> Vec<String> {
        self.shared.roster.snapshot()
    }

    /// Broadcast `text` to everyone. Empty text is a no-op.
    pub async fn send_public_message(&self, text: &str) -> Result<(), ClientError> {
        if text.is_empty() {
            return Ok(());
        }
        self.send_intent(Intent::PublicMessage {
            text: text.to_owned(),
        })
        .await
    }

    /// Send `text` to `to` only. Empty text is a no-op; an empty target
    /// means public.
    pub async fn send_private_message(&self, text: &str, to: &str) -> Result<(), ClientError> {
        if text.is_empty() {
            return Ok(());
        }
        let intent = if to.is_empty() {
            Intent::PublicMessage {
                text: text.to_owned(),
            }
        } else {
            Intent::PrivateMessage {
                text: text.to_owned(),
                to: to.to_owned(),
            }
        };
        self.send_intent(intent).await
    }

    /// Ask the server to add `nick` as a contact. Empty nick is a no-op.
    ///
    /// The roster changes when the server confirms with `add_contact`.
    pub async fn add_contact(&self, nick: &str) -> Result<(), ClientError> {
        if nick.is_empty() {
            return Ok(());
        }
        self.send_intent(Intent::AddContact {
            nick: nick.to_owned(),
        })
        .await
    }

    /// Ask for the full contact list. Does not wait for the reply, which
    /// arrives later as [`SessionEvent::RosterReplaced`].
    pub async fn request_roster(&self) -> Result<(), ClientError> {
        self.send_intent(Intent::RequestRoster {
            identity: self.shared.config.identity.clone(),
        })
        .await
    }

    async fn send_intent(&self, intent: Intent) -> Result<(), ClientError> {
        let state = self.state();
        let writer = match self.shared.writer() {
            Some(writer) if state.is_open() => writer,
            _ => return Err(ClientError::NotConnected { state }),
        };

        let envelope = intent.into_envelope();
        debug!(kind = %envelope.kind, to = %envelope.to, "sending envelope");
        writer.send(&envelope).await.inspect_err(|error| {
            warn!(kind = %envelope.kind, error = %error, "write failed");
        })
    }

    /// Stop reading, close the connection and wait for the reader task.
    ///
    /// Idempotent. Publishes `SessionClosed` unless the session was already
    /// closed.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        if let Some(writer) = self.shared.take_writer() {
            writer.close().await;
        }

        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = supervisor
            && let Err(error) = handle.await
        {
            warn!(error = %error, "session task ended abnormally");
        }

        self.shared.finish(CloseReason::Shutdown);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// Owns the reader for the lifetime of the session. Runs the inbound loop,
/// and when it stops either reconnects or closes the session.
async fn supervise(shared: Arc<Shared>, mut reader: FrameReader) {
    let inbound = InboundLoop::new(Arc::clone(&shared.roster), Arc::clone(&shared.bus));

    loop {
        let stop = inbound.run(&mut reader, &shared.shutdown).await;
        if let Some(writer) = shared.take_writer() {
            writer.close().await;
        }

        if stop.is_shutdown() {
            shared.finish(CloseReason::Shutdown);
            return;
        }

        let Some(policy) = shared.config.reconnect else {
            shared.finish(stop.into_close_reason());
            return;
        };

        warn!(reason = ?stop, "connection lost, reconnecting");
        match reconnect(&shared, policy).await {
            Ok(next) => reader = next,
            Err(reason) => {
                shared.finish(reason);
                return;
            }
        }
    }
}

/// Re-run dial and handshake with backoff. Sends issued meanwhile fail fast
/// with `NotConnected`; nothing is queued for replay.
async fn reconnect(shared: &Shared, policy: ReconnectPolicy) -> Result<FrameReader, CloseReason> {
    shared.set_state(ConnectionState::Reconnecting);

    for attempt in 0..policy.max_attempts() {
        let delay = policy.delay_for_attempt(attempt);
        shared.bus.publish(&SessionEvent::Reconnecting {
            attempt: attempt + 1,
        });
        debug!(attempt = attempt + 1, ?delay, "waiting before redial");

        let established = tokio::select! {
            () = shared.shutdown.cancelled() => return Err(CloseReason::Shutdown),
            established = async {
                tokio::time::sleep(delay).await;
                establish(&shared.config).await
            } => established,
        };

        match established {
            Ok((reader, writer)) => {
                shared.install_writer(writer.clone());
                shared.set_state(ConnectionState::Open);
                info!(attempt = attempt + 1, "reconnected");
                shared.bus.publish(&SessionEvent::Reconnected);
                if let Err(error) = shared.request_roster(&writer).await {
                    warn!(error = %error, "roster request after reconnect failed");
                }
                return Ok(reader);
            }
            Err(error) => {
                warn!(attempt = attempt + 1, error = %error, "reconnect attempt failed");
            }
        }
    }

    Err(CloseReason::ReconnectExhausted {
        attempts: policy.max_attempts(),
    })
}
