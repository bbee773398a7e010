//! Interactive chat client.
//!
//! Connects to a chat server and runs the initiator side of a session:
//! announce a username, then alternate send-then-receive until either side
//! says goodbye.

use crate::config::ClientConfig;
use crate::console::{write_line, write_prompt};
use crate::session::{Session, SessionError, Termination};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Longest username accepted, in bytes.
pub const MAX_USERNAME: usize = 10;

/// Reduce an entered line to a one-word username.
///
/// Lines longer than `MAX_USERNAME` bytes are rejected; otherwise
/// everything from the first space on is dropped. Invalid UTF-8 is
/// replaced rather than refused.
pub fn parse_username(line: &[u8]) -> Result<String, ClientError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.len() > MAX_USERNAME {
        return Err(ClientError::UsernameTooLong(line.len()));
    }
    let word = line.split(|&b| b == b' ').next().unwrap_or_default();
    Ok(String::from_utf8_lossy(word).into_owned())
}

/// Ask the operator for a username until a valid one is entered.
pub async fn prompt_username<I, O>(input: &mut I, console: &mut O) -> Result<String, ClientError>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    write_prompt(console, "Please enter a one-word username (up to 10 chars): ")
        .await
        .map_err(ClientError::Console)?;

    let mut line = Vec::new();
    loop {
        line.clear();
        let n = input
            .read_until(b'\n', &mut line)
            .await
            .map_err(ClientError::Console)?;
        if n == 0 {
            return Err(ClientError::Console(io::ErrorKind::UnexpectedEof.into()));
        }

        match parse_username(&line) {
            Ok(name) => return Ok(name),
            Err(e) => {
                debug!(error = %e, "Rejected username");
                write_prompt(console, "That name is too long. Try again: ")
                    .await
                    .map_err(ClientError::Console)?;
            }
        }
    }
}

/// Run one conversation against the configured server.
pub async fn run<I, O>(
    config: &ClientConfig,
    input: &mut I,
    console: &mut O,
) -> Result<Termination, ClientError>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let name = match config.name {
        Some(ref name) => parse_username(name.as_bytes())?,
        None => prompt_username(input, console).await?,
    };

    write_line(console, format!("Hello {name}.\n"))
        .await
        .map_err(ClientError::Console)?;
    write_prompt(console, &format!("Connecting to {}...", config.host))
        .await
        .map_err(ClientError::Console)?;

    // Tries every resolved address in turn.
    let stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .map_err(ClientError::Connect)?;
    info!(peer = ?stream.peer_addr().ok(), "Connected");

    write_line(console, " Connection established.\n")
        .await
        .map_err(ClientError::Console)?;

    let reason = Session::new(stream, name).run_initiator(input, console).await?;
    if reason == Termination::RemoteQuit {
        write_line(console, "Connection closed.")
            .await
            .map_err(ClientError::Console)?;
    }
    Ok(reason)
}

/// Client errors
#[derive(Debug)]
pub enum ClientError {
    /// Could not reach the server.
    Connect(io::Error),
    /// The conversation itself failed.
    Session(SessionError),
    /// Reading or writing the operator's terminal failed.
    Console(io::Error),
    /// Entered username exceeds `MAX_USERNAME`; carries its length.
    UsernameTooLong(usize),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connect(e) => write!(f, "CLIENT: (failed to connect) {}", e),
            ClientError::Session(e) => write!(f, "CLIENT: {}", e),
            ClientError::Console(e) => write!(f, "CLIENT: console error: {}", e),
            ClientError::UsernameTooLong(len) => write!(
                f,
                "username is {} bytes, at most {} allowed",
                len, MAX_USERNAME
            ),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connect(e) | ClientError::Console(e) => Some(e),
            ClientError::Session(e) => Some(e),
            ClientError::UsernameTooLong(_) => None,
        }
    }
}

impl From<SessionError> for ClientError {
    fn from(e: SessionError) -> Self {
        ClientError::Session(e)
    }
}
