use crate::commands::{Command, HELP, parse};
use crate::input::InputLines;
use crate::render::{contacts_line, event_line};
use anyhow::{Context, Result};
use parlor_client::{ClientError, Session};
use parlor_core::{EventStream, SessionEvent};
use std::io::Write;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

/// Line-oriented front end: reads commands, prints session events.
pub(crate) struct Shell<W> {
    session: Session,
    /// Recipient of plain lines; `None` means everyone.
    target: Option<String>,
    out: W,
}

impl<W: Write> Shell<W> {
    pub(crate) fn new(session: Session, out: W) -> Self {
        Self {
            session,
            target: None,
            out,
        }
    }

    /// Run until `/quit`, end of input, or the session closes. Shuts the
    /// session down on the way out.
    pub(crate) async fn run(mut self, mut input: InputLines, mut events: EventStream) -> Result<()> {
        let result = loop {
            tokio::select! {
                line = input.recv() => {
                    let line = match line {
                        Some(Ok(line)) => line,
                        Some(Err(error)) => break Err(error).context("failed to read input"),
                        None => {
                            debug!("end of input");
                            break Ok(());
                        }
                    };
                    match self.handle(parse(&line)).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => break Ok(()),
                        Err(error) => break Err(error),
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break Ok(());
                    };
                    if let Err(error) = self.show_event(&event) {
                        break Err(error);
                    }
                    if matches!(event, SessionEvent::SessionClosed { .. }) {
                        break Ok(());
                    }
                }
            }
        };

        self.session.shutdown().await;
        result
    }

    fn show_event(&mut self, event: &SessionEvent) -> Result<()> {
        let line = event_line(event, self.session.identity());
        writeln!(self.out, "{line}").context("failed to write to terminal")
    }

    fn say(&mut self, line: impl std::fmt::Display) -> Result<()> {
        writeln!(self.out, "{line}").context("failed to write to terminal")
    }

    /// Report a failed send without ending the shell.
    fn report(&mut self, result: Result<(), ClientError>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!(error = %error, "command failed");
                self.say(format!("* not sent: {error}"))
            }
        }
    }

    pub(crate) async fn handle(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Say(text) => {
                let result = match &self.target {
                    Some(to) => self.session.send_private_message(&text, to).await,
                    None => self.session.send_public_message(&text).await,
                };
                self.report(result)?;
            }
            Command::Target(Some(nick)) => {
                self.say(format!("* talking privately to {nick}"))?;
                self.target = Some(nick);
            }
            Command::Target(None) => {
                self.target = None;
                self.say("* talking to everyone")?;
            }
            Command::Whisper { to, text } => {
                let result = self.session.send_private_message(&text, &to).await;
                self.report(result)?;
            }
            Command::AddContact(nick) => {
                let result = self.session.add_contact(&nick).await;
                self.report(result)?;
            }
            Command::Contacts => {
                let line = contacts_line(&self.session.roster());
                self.say(line)?;
            }
            Command::Refresh => {
                let result = self.session.request_roster().await;
                self.report(result)?;
            }
            Command::Help => self.say(HELP)?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Empty => {}
            Command::Usage(usage) => self.say(format!("* usage: {usage}"))?,
            Command::Unknown(name) => self.say(format!("* unknown command /{name}, try /help"))?,
        }
        Ok(Flow::Continue)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::spawn_line_reader;
    use parlor_client::SessionConfig;
    use parlor_client::testkit::{ServerConnection, TestServer, chat_message};
    use parlor_core::EnvelopeKind;
    use std::time::Duration;

    async fn shell(server: &mut TestServer) -> (Shell<Vec<u8>>, ServerConnection, EventStream) {
        let session = Session::connect(SessionConfig::new(server.url(), "alice"))
            .await
            .unwrap();
        let events = session.subscribe();
        let peer = server.accept().await.unwrap();
        (Shell::new(session, Vec::new()), peer, events)
    }

    fn output(shell: &Shell<Vec<u8>>) -> String {
        String::from_utf8_lossy(&shell.out).into_owned()
    }

    #[tokio::test]
    async fn plain_lines_follow_the_current_target() {
        let mut server = TestServer::start().await.unwrap();
        let (mut shell, mut peer, _events) = shell(&mut server).await;

        shell.handle(parse("hello")).await.unwrap();
        let public = peer.recv_envelope().await.unwrap();
        assert_eq!((public.to.as_str(), public.msg.as_str()), ("", "hello"));

        shell.handle(parse("/to bob")).await.unwrap();
        shell.handle(parse("just us")).await.unwrap();
        let private = peer.recv_envelope().await.unwrap();
        assert_eq!((private.to.as_str(), private.msg.as_str()), ("bob", "just us"));

        shell.handle(parse("/to all")).await.unwrap();
        shell.handle(parse("everyone again")).await.unwrap();
        assert_eq!(peer.recv_envelope().await.unwrap().to, "");

        assert!(output(&shell).contains("* talking privately to bob"));
        shell.session.shutdown().await;
    }

    #[tokio::test]
    async fn msg_add_and_refresh_hit_the_wire() {
        let mut server = TestServer::start().await.unwrap();
        let (mut shell, mut peer, _events) = shell(&mut server).await;

        shell.handle(parse("/msg carol hi there")).await.unwrap();
        let whisper = peer.recv_envelope().await.unwrap();
        assert_eq!(whisper.to, "carol");
        assert_eq!(whisper.msg, "hi there");

        shell.handle(parse("/add carol")).await.unwrap();
        let add = peer.recv_envelope().await.unwrap();
        assert_eq!(add.kind, EnvelopeKind::AddContact);
        assert_eq!(add.msg, "carol");

        shell.handle(parse("/refresh")).await.unwrap();
        let refresh = peer.recv_envelope().await.unwrap();
        assert_eq!(refresh.kind, EnvelopeKind::GetContactList);
        assert_eq!(refresh.nick, "alice");

        shell.session.shutdown().await;
    }

    #[tokio::test]
    async fn blank_lines_and_usage_errors_send_nothing() {
        let mut server = TestServer::start().await.unwrap();
        let (mut shell, mut peer, _events) = shell(&mut server).await;

        for line in ["", "/msg bob", "/add", "/nope"] {
            assert_eq!(shell.handle(parse(line)).await.unwrap(), Flow::Continue);
        }
        assert!(
            peer.recv_text_within(Duration::from_millis(200))
                .await
                .is_none()
        );

        let out = output(&shell);
        assert!(out.contains("* usage: /msg NICK TEXT"));
        assert!(out.contains("* unknown command /nope"));
        shell.session.shutdown().await;
    }

    #[tokio::test]
    async fn send_after_close_is_reported_not_fatal() {
        let mut server = TestServer::start().await.unwrap();
        let (mut shell, _peer, _events) = shell(&mut server).await;

        shell.session.shutdown().await;
        assert_eq!(
            shell.handle(parse("anyone?")).await.unwrap(),
            Flow::Continue
        );
        assert!(output(&shell).contains("* not sent:"));
    }

    /// A terminal nobody types into: every read blocks until the gate drops.
    struct IdleTerminal(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for IdleTerminal {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn run_prints_events_until_the_session_closes() {
        let mut server = TestServer::start().await.unwrap();
        let (shell, mut peer, events) = shell(&mut server).await;
        let (_keep_open, input) = tokio::sync::mpsc::unbounded_channel();

        peer.send_envelope(&chat_message("bob", "", "hey alice"))
            .await
            .unwrap();
        peer.close().await;

        let mut out = Vec::new();
        let shell = Shell::new(shell.session, &mut out);
        tokio::time::timeout(Duration::from_secs(5), shell.run(input, events))
            .await
            .unwrap()
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("] bob: hey alice"), "{out}");
        assert!(out.contains("* server closed the connection"), "{out}");
    }

    #[test]
    fn server_close_exits_while_terminal_read_is_pending() {
        let (gate, idle) = std::sync::mpsc::channel::<()>();
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let out = runtime.block_on(async {
                let mut server = TestServer::start().await.unwrap();
                let (shell, peer, events) = shell(&mut server).await;
                let input = spawn_line_reader(IdleTerminal(idle)).unwrap();

                peer.close().await;

                let mut out = Vec::new();
                Shell::new(shell.session, &mut out)
                    .run(input, events)
                    .await
                    .unwrap();
                out
            });
            // Dropping the runtime must not wait for the pending read.
            drop(runtime);
            done_tx.send(out).unwrap();
        });

        let out = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("shell did not exit while input was still open");
        assert!(String::from_utf8(out).unwrap().contains("* server closed the connection"));
        drop(gate);
    }

    #[tokio::test]
    async fn quit_shuts_the_session_down() {
        let mut server = TestServer::start().await.unwrap();
        let (shell, mut peer, events) = shell(&mut server).await;

        let input = spawn_line_reader(&b"/quit\n"[..]).unwrap();
        shell.run(input, events).await.unwrap();

        assert!(peer.recv_text_within(Duration::from_secs(5)).await.is_none());
    }

    #[tokio::test]
    async fn end_of_input_quits() {
        let mut server = TestServer::start().await.unwrap();
        let (shell, mut peer, events) = shell(&mut server).await;

        let input = spawn_line_reader(&b"bye all\n"[..]).unwrap();
        shell.run(input, events).await.unwrap();

        assert_eq!(peer.recv_envelope().await.unwrap().msg, "bye all");
        assert!(peer.recv_text_within(Duration::from_secs(5)).await.is_none());
    }
}
