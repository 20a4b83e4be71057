//! Inbound event loop: pulls envelopes off the connection and routes them.

use crate::connection::FrameReader;
use crate::error::ClientError;
use parlor_core::{
    ChatEnvelope, ChatMessage, CloseReason, EnvelopeKind, EventBus, Roster, SessionEvent,
    decode_contact_list,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    Closed,
    ReadFailed(String),
    ProtocolViolation(String),
}

impl StopReason {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    pub fn into_close_reason(self) -> CloseReason {
        match self {
            Self::Shutdown => CloseReason::Shutdown,
            Self::Closed => CloseReason::ServerClosed,
            Self::ReadFailed(error) => CloseReason::ReadFailed(error),
            Self::ProtocolViolation(error) => CloseReason::ProtocolViolation(error),
        }
    }
}

/// What a single envelope turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Message,
    RosterReplaced,
    ContactAdded,
    /// `add_contact` for a nick already on the roster, or with no nick.
    ContactUnchanged,
    /// `contact_list` whose body did not decode.
    Skipped,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct InboundLoop {
    roster: Arc<Roster>,
    bus: Arc<EventBus>,
}

impl InboundLoop {
    pub fn new(roster: Arc<Roster>, bus: Arc<EventBus>) -> Self {
        Self { roster, bus }
    }

    /// Read and dispatch until the connection ends or `shutdown` fires.
    ///
    /// The only suspension point is the next frame read, which `shutdown`
    /// interrupts.
    pub async fn run(&self, reader: &mut FrameReader, shutdown: &CancellationToken) -> StopReason {
        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("inbound loop cancelled");
                    return StopReason::Shutdown;
                }
                next = reader.recv() => next,
            };

            match next {
                Ok(envelope) => {
                    self.dispatch(envelope);
                }
                Err(ClientError::ConnectionClosed) => {
                    info!("server closed the connection");
                    return StopReason::Closed;
                }
                Err(ClientError::Codec(error)) => {
                    warn!(error = %error, "malformed envelope from server, stopping");
                    return StopReason::ProtocolViolation(error.to_string());
                }
                Err(error) => {
                    warn!(error = %error, "read failed, stopping");
                    return StopReason::ReadFailed(error.to_string());
                }
            }
        }
    }

    /// Route one decoded envelope to the roster or to subscribers.
    pub fn dispatch(&self, envelope: ChatEnvelope) -> Dispatch {
        debug!(
            kind = %envelope.kind,
            from = %envelope.nick,
            to = %envelope.to,
            "envelope received"
        );

        match envelope.kind {
            EnvelopeKind::Message => {
                self.bus.publish(&SessionEvent::MessageReceived(
                    ChatMessage::from_envelope(envelope),
                ));
                Dispatch::Message
            }
            EnvelopeKind::ContactList => match decode_contact_list(&envelope.msg) {
                Ok(nicks) => {
                    self.roster.replace_all(nicks);
                    Dispatch::RosterReplaced
                }
                Err(error) => {
                    warn!(error = %error, body = %envelope.msg, "dropping contact list");
                    Dispatch::Skipped
                }
            },
            // Servers echo the added nick in `to`, not in `msg`.
            EnvelopeKind::AddContact => {
                if self.roster.add_if_absent(&envelope.to) {
                    Dispatch::ContactAdded
                } else {
                    Dispatch::ContactUnchanged
                }
            }
            EnvelopeKind::RemoveContact | EnvelopeKind::GetContactList | EnvelopeKind::Other(_) => {
                debug!(kind = %envelope.kind, "ignoring envelope");
                Dispatch::Ignored
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::testkit::{TestServer, chat_message, contact_added};
    use parlor_core::{EventStream, decode};

    fn setup() -> (InboundLoop, Arc<Roster>, EventStream) {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        let roster = Arc::new(Roster::new(Arc::clone(&bus)));
        (InboundLoop::new(Arc::clone(&roster), bus), roster, events)
    }

    #[test]
    fn message_without_kind_is_forwarded_verbatim() {
        let (inbound, _roster, mut events) = setup();
        let outcome = inbound.dispatch(decode(r#"{"nick":"bob","msg":"hello"}"#).unwrap());

        assert_eq!(outcome, Dispatch::Message);
        let SessionEvent::MessageReceived(message) = events.try_recv().unwrap() else {
            panic!("expected a chat message");
        };
        assert_eq!(message.from, "bob");
        assert_eq!(message.body, "hello");
        assert!(message.to.is_empty());
    }

    #[test]
    fn contact_list_replaces_roster() {
        let (inbound, roster, mut events) = setup();
        roster.add_if_absent("old");
        let _ = events.try_recv();

        let outcome =
            inbound.dispatch(decode(r#"{"type":"contact_list","msg":"[\"alice\",\"bob\"]"}"#).unwrap());

        assert_eq!(outcome, Dispatch::RosterReplaced);
        assert_eq!(roster.snapshot(), vec!["alice".to_owned(), "bob".to_owned()]);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::RosterReplaced {
                nicks: vec!["alice".into(), "bob".into()]
            }
        );
    }

    #[test]
    fn malformed_contact_list_is_skipped() {
        let (inbound, roster, mut events) = setup();
        roster.add_if_absent("keep");
        let _ = events.try_recv();

        let outcome = inbound.dispatch(decode(r#"{"type":"contact_list","msg":"[alice"}"#).unwrap());

        assert_eq!(outcome, Dispatch::Skipped);
        assert_eq!(roster.snapshot(), vec!["keep".to_owned()]);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn add_contact_reads_nick_from_target_field() {
        let (inbound, roster, mut events) = setup();

        assert_eq!(inbound.dispatch(contact_added("carol")), Dispatch::ContactAdded);
        assert_eq!(
            inbound.dispatch(contact_added("carol")),
            Dispatch::ContactUnchanged
        );
        assert_eq!(inbound.dispatch(contact_added("")), Dispatch::ContactUnchanged);

        assert_eq!(roster.snapshot(), vec!["carol".to_owned()]);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ContactAdded {
                nick: "carol".into()
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn other_kinds_are_ignored() {
        let (inbound, roster, mut events) = setup();
        for frame in [
            r#"{"type":"remove_contact","to":"bob"}"#,
            r#"{"type":"get_contact","nick":"x"}"#,
            r#"{"type":"typing","nick":"bob"}"#,
        ] {
            assert_eq!(inbound.dispatch(decode(frame).unwrap()), Dispatch::Ignored);
        }
        assert!(roster.is_empty());
        assert!(events.try_recv().is_err());
    }

    async fn connected(server: &mut TestServer) -> (FrameReader, crate::testkit::ServerConnection) {
        let mut connection = Connection::dial(server.url(), None).await.unwrap();
        connection.handshake("alice").await.unwrap();
        let (reader, _writer) = connection.into_split();
        (reader, server.accept().await.unwrap())
    }

    #[tokio::test]
    async fn loop_survives_bad_contact_list_and_keeps_reading() {
        let mut server = TestServer::start().await.unwrap();
        let (mut reader, mut peer) = connected(&mut server).await;
        let (inbound, _roster, mut events) = setup();

        peer.send_text(r#"{"type":"contact_list","msg":"[alice"}"#)
            .await
            .unwrap();
        peer.send_envelope(&chat_message("bob", "", "still here"))
            .await
            .unwrap();
        peer.close().await;

        let stop = inbound.run(&mut reader, &CancellationToken::new()).await;
        assert_eq!(stop, StopReason::Closed);

        let SessionEvent::MessageReceived(message) = events.try_recv().unwrap() else {
            panic!("expected the message after the bad contact list");
        };
        assert_eq!(message.body, "still here");
    }

    #[tokio::test]
    async fn malformed_envelope_stops_the_loop() {
        let mut server = TestServer::start().await.unwrap();
        let (mut reader, mut peer) = connected(&mut server).await;
        let (inbound, _roster, mut events) = setup();

        peer.send_text("garbage").await.unwrap();
        peer.send_envelope(&chat_message("bob", "", "never seen"))
            .await
            .unwrap();

        let stop = inbound.run(&mut reader, &CancellationToken::new()).await;
        assert!(matches!(stop, StopReason::ProtocolViolation(_)));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_connection_is_a_read_failure() {
        let mut server = TestServer::start().await.unwrap();
        let (mut reader, peer) = connected(&mut server).await;
        let (inbound, _roster, _events) = setup();

        peer.abort();

        let stop = inbound.run(&mut reader, &CancellationToken::new()).await;
        assert!(matches!(
            stop,
            StopReason::ReadFailed(_) | StopReason::Closed
        ));
        assert!(!stop.is_shutdown());
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_pending_read() {
        let mut server = TestServer::start().await.unwrap();
        let (mut reader, _peer) = connected(&mut server).await;
        let (inbound, _roster, _events) = setup();

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let stop = inbound.run(&mut reader, &token).await;
        assert_eq!(stop, StopReason::Shutdown);
    }

    #[test]
    fn stop_reasons_map_to_close_reasons() {
        assert_eq!(StopReason::Closed.into_close_reason(), CloseReason::ServerClosed);
        assert_eq!(
            StopReason::ReadFailed("reset".into()).into_close_reason(),
            CloseReason::ReadFailed("reset".into())
        );
    }
}
