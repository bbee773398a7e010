//! One conversation over one connection.
//!
//! A session moves through `Handshaking -> Chatting -> Closed`. The
//! responder (server) side reads the peer's name, answers with its own,
//! then alternates receive-then-send. The initiator (client) side mirrors
//! that: name first, then send-then-receive. Steps never overlap, so the
//! stream needs no locking.

use crate::console::{write_line, write_prompt};
use crate::protocol::{
    compose_message, display_name, parse_incoming, parse_outgoing, prompt, Incoming, Outgoing,
    HANDWAVE, MSG_LENGTH, QUIT_COMMAND,
};
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
};
use tracing::{debug, trace};

/// Which side ended the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The peer sent the handwave.
    RemoteQuit,
    /// The local operator typed the quit command.
    LocalQuit,
}

/// Current phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Chatting,
    Closed(Termination),
}

/// Outcome of a single receive or send step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Closed(Termination),
}

/// A chat session that exclusively owns its connection.
pub struct Session<S> {
    stream: S,
    local_name: String,
    remote_name: Bytes,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, local_name: impl Into<String>) -> Self {
        Self {
            stream,
            local_name: local_name.into(),
            remote_name: Bytes::new(),
            state: SessionState::Handshaking,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The peer's name exactly as received during the handshake.
    pub fn remote_name(&self) -> &[u8] {
        &self.remote_name
    }

    pub fn termination(&self) -> Option<Termination> {
        match self.state {
            SessionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Run the responder side to completion and close the connection.
    pub async fn run<I, O>(
        mut self,
        input: &mut I,
        console: &mut O,
    ) -> Result<Termination, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let result = self.respond(input, console).await;
        self.close().await;
        result
    }

    /// Run the initiator side to completion and close the connection.
    pub async fn run_initiator<I, O>(
        mut self,
        input: &mut I,
        console: &mut O,
    ) -> Result<Termination, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let result = self.initiate(input, console).await;
        self.close().await;
        result
    }

    async fn respond<I, O>(&mut self, input: &mut I, console: &mut O) -> Result<Termination, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        self.accept_handshake(console).await?;
        loop {
            if let Step::Closed(reason) = self.receive_step(console).await? {
                return Ok(reason);
            }
            if let Step::Closed(reason) = self.send_step(input, console).await? {
                return Ok(reason);
            }
        }
    }

    async fn initiate<I, O>(&mut self, input: &mut I, console: &mut O) -> Result<Termination, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        self.initiate_handshake(console).await?;
        loop {
            if let Step::Closed(reason) = self.send_step(input, console).await? {
                return Ok(reason);
            }
            if let Step::Closed(reason) = self.receive_step(console).await? {
                return Ok(reason);
            }
        }
    }

    /// Responder handshake: take the peer's name, answer with ours.
    ///
    /// Whatever bytes arrive form the name, including none at all.
    pub async fn accept_handshake<O>(&mut self, console: &mut O) -> Result<(), SessionError>
    where
        O: AsyncWrite + Unpin,
    {
        debug_assert_eq!(self.state, SessionState::Handshaking);

        self.remote_name = self.read_chunk().await?;
        self.stream.write_all(self.local_name.as_bytes()).await?;
        self.stream.flush().await?;

        let remote = display_name(&self.remote_name);
        debug!(remote = %remote, "Handshake complete");

        write_line(console, format!("Connection accepted. Now talking to {remote}."))
            .await
            .map_err(SessionError::Console)?;
        write_line(console, format!("Type '{QUIT_COMMAND}' to end the conversation."))
            .await
            .map_err(SessionError::Console)?;

        self.state = SessionState::Chatting;
        Ok(())
    }

    /// Initiator handshake: announce our name, take the peer's.
    pub async fn initiate_handshake<O>(&mut self, console: &mut O) -> Result<(), SessionError>
    where
        O: AsyncWrite + Unpin,
    {
        debug_assert_eq!(self.state, SessionState::Handshaking);

        self.stream.write_all(self.local_name.as_bytes()).await?;
        self.stream.flush().await?;
        self.remote_name = self.read_chunk().await?;
        if self.remote_name.is_empty() {
            return Err(SessionError::PeerClosed);
        }

        let remote = display_name(&self.remote_name);
        debug!(remote = %remote, "Handshake complete");

        write_line(
            console,
            format!("You are now talking to {remote}. Type '{QUIT_COMMAND}' to end the conversation."),
        )
        .await
        .map_err(SessionError::Console)?;

        self.state = SessionState::Chatting;
        Ok(())
    }

    /// Wait for one chunk from the peer and show it, or close on the handwave.
    pub async fn receive_step<O>(&mut self, console: &mut O) -> Result<Step, SessionError>
    where
        O: AsyncWrite + Unpin,
    {
        let chunk = self.read_chunk().await?;
        if chunk.is_empty() {
            return Err(SessionError::PeerClosed);
        }
        trace!(len = chunk.len(), "Received chunk");

        match parse_incoming(&chunk) {
            Incoming::Handwave => {
                let remote = display_name(&self.remote_name);
                write_line(console, format!("{remote} has left the chat."))
                    .await
                    .map_err(SessionError::Console)?;
                Ok(self.finish(Termination::RemoteQuit))
            }
            Incoming::Message(text) => {
                write_line(console, text)
                    .await
                    .map_err(SessionError::Console)?;
                Ok(Step::Continue)
            }
        }
    }

    /// Read one operator line and send it, or send the handwave on quit.
    ///
    /// End of operator input counts as quitting.
    pub async fn send_step<I, O>(&mut self, input: &mut I, console: &mut O) -> Result<Step, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        write_prompt(console, &prompt(&self.local_name))
            .await
            .map_err(SessionError::Console)?;

        // Raw bytes: operator text need not be UTF-8.
        let mut line = Vec::new();
        let n = input
            .read_until(b'\n', &mut line)
            .await
            .map_err(SessionError::Console)?;

        let outgoing = if n == 0 {
            debug!("Operator input closed");
            write_line(console, "").await.map_err(SessionError::Console)?;
            Outgoing::Quit
        } else {
            parse_outgoing(&line)
        };

        match outgoing {
            Outgoing::Quit => {
                self.stream.write_all(HANDWAVE).await?;
                self.stream.flush().await?;
                write_line(console, "Connection closed.")
                    .await
                    .map_err(SessionError::Console)?;
                Ok(self.finish(Termination::LocalQuit))
            }
            Outgoing::Message(text) => {
                let msg = compose_message(&self.local_name, text);
                self.stream.write_all(&msg).await?;
                self.stream.flush().await?;
                trace!(len = msg.len(), "Sent message");
                Ok(Step::Continue)
            }
        }
    }

    /// One read from the peer, capped at `MSG_LENGTH`. Empty means EOF.
    async fn read_chunk(&mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::zeroed(MSG_LENGTH);
        let n = self.stream.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf.freeze())
    }

    fn finish(&mut self, reason: Termination) -> Step {
        debug!(?reason, "Session closing");
        self.state = SessionState::Closed(reason);
        Step::Closed(reason)
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            trace!(error = %e, "Shutdown after session failed");
        }
    }
}

/// Errors that end a single session.
#[derive(Debug)]
pub enum SessionError {
    /// I/O failure on the peer connection.
    Io(io::Error),
    /// I/O failure on the operator's console or input.
    Console(io::Error),
    /// The peer closed the connection mid-conversation.
    PeerClosed,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "connection error: {}", e),
            SessionError::Console(e) => write!(f, "console error: {}", e),
            SessionError::PeerClosed => write!(f, "peer closed the connection"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(e) | SessionError::Console(e) => Some(e),
            SessionError::PeerClosed => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn console_text(console: &[u8]) -> String {
        String::from_utf8_lossy(console).into_owned()
    }

    #[tokio::test]
    async fn test_remote_quit_scenario() {
        let stream = Builder::new()
            .read(b"Alice")
            .write(b"notHAL")
            .read(b"hello")
            .write(b"notHAL> hi there")
            .read(b"bye")
            .build();

        let mut input: &[u8] = b"hi there\n";
        let mut console = Vec::new();

        let reason = Session::new(stream, "notHAL")
            .run(&mut input, &mut console)
            .await
            .unwrap();

        assert_eq!(reason, Termination::RemoteQuit);
        assert_eq!(
            console_text(&console),
            "Connection accepted. Now talking to Alice.\n\
             Type '\\quit' to end the conversation.\n\
             hello\n\
             notHAL> Alice has left the chat.\n"
        );
    }

    #[tokio::test]
    async fn test_local_quit_sends_handwave() {
        let stream = Builder::new()
            .read(b"Alice")
            .write(b"notHAL")
            .read(b"hello")
            .write(b"bye")
            .build();

        let mut input: &[u8] = b"\\quit\nnever sent\n";
        let mut console = Vec::new();

        let reason = Session::new(stream, "notHAL")
            .run(&mut input, &mut console)
            .await
            .unwrap();

        assert_eq!(reason, Termination::LocalQuit);
        assert_eq!(input, b"never sent\n");
        assert!(console_text(&console).ends_with("notHAL> Connection closed.\n"));
    }

    #[tokio::test]
    async fn test_handwave_stops_before_send_step() {
        // No write after the handshake: any send would fail the mock.
        let stream = Builder::new()
            .read(b"Alice")
            .write(b"notHAL")
            .read(b"bye\r\n")
            .build();

        let mut input: &[u8] = b"should stay unread\n";
        let mut console = Vec::new();

        let reason = Session::new(stream, "notHAL")
            .run(&mut input, &mut console)
            .await
            .unwrap();

        assert_eq!(reason, Termination::RemoteQuit);
        assert_eq!(input, b"should stay unread\n");
        assert!(!console_text(&console).contains("notHAL> "));
    }

    #[tokio::test]
    async fn test_handshake_records_raw_name() {
        let name: Vec<u8> = (0..MSG_LENGTH).map(|i| b'a' + (i % 26) as u8).collect();
        let stream = Builder::new().read(&name).write(b"notHAL").build();

        let mut session = Session::new(stream, "notHAL");
        let mut console = Vec::new();
        session.accept_handshake(&mut console).await.unwrap();

        assert_eq!(session.remote_name(), &name[..]);
        assert_eq!(session.state(), SessionState::Chatting);
        assert_eq!(session.termination(), None);
    }

    #[tokio::test]
    async fn test_handshake_name_is_not_trimmed() {
        let stream = Builder::new().read(b" Bob \n").write(b"notHAL").build();

        let mut session = Session::new(stream, "notHAL");
        let mut console = Vec::new();
        session.accept_handshake(&mut console).await.unwrap();

        assert_eq!(session.remote_name(), b" Bob \n");
    }

    #[tokio::test]
    async fn test_empty_handshake_proceeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            client.shutdown().await.unwrap();
            let mut name = Vec::new();
            client.read_to_end(&mut name).await.unwrap();
            name
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut session = Session::new(stream, "notHAL");
        let mut console = Vec::new();
        session.accept_handshake(&mut console).await.unwrap();

        assert_eq!(session.remote_name(), b"");
        assert_eq!(session.state(), SessionState::Chatting);
        assert!(console_text(&console).contains("Now talking to ."));

        // The peer is gone, so the first receive ends the session.
        let err = session.receive_step(&mut console).await.unwrap_err();
        assert!(matches!(err, SessionError::PeerClosed));

        session.close().await;
        assert_eq!(peer.await.unwrap(), b"notHAL");
    }

    #[tokio::test]
    async fn test_exchanges_keep_session_chatting() {
        let mut builder = Builder::new();
        builder.read(b"Alice").write(b"notHAL");
        for i in 0..5 {
            builder
                .read(format!("message {i}\n").as_bytes())
                .write(format!("notHAL> reply {i}").as_bytes());
        }
        let stream = builder.build();

        let mut input: &[u8] = b"reply 0\nreply 1\nreply 2\nreply 3\nreply 4\n";
        let mut console = Vec::new();
        let mut session = Session::new(stream, "notHAL");
        session.accept_handshake(&mut console).await.unwrap();

        for _ in 0..5 {
            assert_eq!(session.receive_step(&mut console).await.unwrap(), Step::Continue);
            assert_eq!(
                session.send_step(&mut input, &mut console).await.unwrap(),
                Step::Continue
            );
            assert_eq!(session.state(), SessionState::Chatting);
        }

        let text = console_text(&console);
        for i in 0..5 {
            assert!(text.contains(&format!("message {i}\n")));
        }
    }

    #[tokio::test]
    async fn test_received_text_is_verbatim() {
        let stream = Builder::new()
            .read(b"Alice")
            .write(b"notHAL")
            .read(b"  spaced  out\t \n")
            .build();

        let mut session = Session::new(stream, "notHAL");
        let mut console = Vec::new();
        session.accept_handshake(&mut console).await.unwrap();
        console.clear();

        assert_eq!(session.receive_step(&mut console).await.unwrap(), Step::Continue);
        assert_eq!(console, b"  spaced  out\n");
    }

    #[tokio::test]
    async fn test_non_utf8_operator_line_is_sent() {
        let stream = Builder::new()
            .read(b"Alice")
            .write(b"notHAL")
            .read(b"hello")
            .write(b"notHAL> caf\xe9")
            .read(b"bye")
            .build();

        let mut input: &[u8] = b"caf\xe9\n";
        let mut console = Vec::new();

        let reason = Session::new(stream, "notHAL")
            .run(&mut input, &mut console)
            .await
            .unwrap();

        assert_eq!(reason, Termination::RemoteQuit);
        assert!(input.is_empty());
    }

    #[tokio::test]
    async fn test_operator_eof_quits() {
        let stream = Builder::new()
            .read(b"Alice")
            .write(b"notHAL")
            .read(b"anyone there?")
            .write(b"bye")
            .build();

        let mut input: &[u8] = b"";
        let mut console = Vec::new();

        let reason = Session::new(stream, "notHAL")
            .run(&mut input, &mut console)
            .await
            .unwrap();

        assert_eq!(reason, Termination::LocalQuit);
    }

    #[tokio::test]
    async fn test_connection_error_ends_session() {
        let stream = Builder::new()
            .read(b"Alice")
            .write(b"notHAL")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let mut input: &[u8] = b"hi\n";
        let mut console = Vec::new();

        let err = Session::new(stream, "notHAL")
            .run(&mut input, &mut console)
            .await
            .unwrap_err();

        match err {
            SessionError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_initiator_sends_first() {
        let stream = Builder::new()
            .write(b"Alice")
            .read(b"notHAL")
            .write(b"Alice> hello")
            .read(b"notHAL> hi there")
            .write(b"bye")
            .build();

        let mut input: &[u8] = b"hello\n\\quit\n";
        let mut console = Vec::new();

        let reason = Session::new(stream, "Alice")
            .run_initiator(&mut input, &mut console)
            .await
            .unwrap();

        assert_eq!(reason, Termination::LocalQuit);
        let text = console_text(&console);
        assert!(text.starts_with("You are now talking to notHAL."));
        assert!(text.contains("notHAL> hi there\n"));
    }
}
