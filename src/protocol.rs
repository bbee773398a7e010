//! Chat wire protocol.
//!
//! There is no framing: each read takes whatever the transport delivers, up
//! to `MSG_LENGTH` bytes, and each write sends its bytes as-is.
//!
//! ```text
//! client -> server: <client name>
//! server -> client: <server name>
//! client -> server: <text> | bye
//! server -> client: <server name>> <text> | bye
//! ...
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Upper bound on a single read from the peer.
pub const MSG_LENGTH: usize = 500;

/// Token either side sends to end the conversation.
pub const HANDWAVE: &[u8] = b"bye";

/// Operator command that ends the conversation.
pub const QUIT_COMMAND: &str = "\\quit";

/// A chunk received from the peer during the chat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming<'a> {
    /// Peer asked to end the conversation.
    Handwave,
    /// Text to show the operator, trailing whitespace removed.
    Message(&'a [u8]),
}

/// A line typed by the operator, as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing<'a> {
    /// Operator asked to end the conversation.
    Quit,
    /// Text to prefix with the local name and send.
    Message(&'a [u8]),
}

/// Classify a chunk read from the peer.
pub fn parse_incoming(chunk: &[u8]) -> Incoming<'_> {
    let text = trim_trailing(chunk);
    if text == HANDWAVE {
        Incoming::Handwave
    } else {
        Incoming::Message(text)
    }
}

/// Classify an operator line. Only the line terminator is removed, so
/// `"\quit "` is sent as an ordinary message. Bytes pass through untouched
/// whatever their encoding.
pub fn parse_outgoing(line: &[u8]) -> Outgoing<'_> {
    let line = strip_line_ending(line);
    if line == QUIT_COMMAND.as_bytes() {
        Outgoing::Quit
    } else {
        Outgoing::Message(line)
    }
}

/// The prompt shown before each operator line, also used as the message prefix.
pub fn prompt(name: &str) -> String {
    format!("{name}> ")
}

/// Compose `<name>> <text>` for the wire.
pub fn compose_message(name: &str, text: &[u8]) -> Bytes {
    let mut msg = BytesMut::with_capacity(name.len() + 2 + text.len());
    msg.put_slice(name.as_bytes());
    msg.put_slice(b"> ");
    msg.put_slice(text);
    msg.freeze()
}

/// Render a peer's name for the console.
///
/// The name is kept as raw bytes; here invalid UTF-8 is replaced and the
/// zero padding some clients send is dropped.
pub fn display_name(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Strip trailing ASCII whitespace and NUL padding.
pub fn trim_trailing(chunk: &[u8]) -> &[u8] {
    let end = chunk
        .iter()
        .rposition(|&b| !(b.is_ascii_whitespace() || b == 0 || b == 0x0b))
        .map_or(0, |i| i + 1);
    &chunk[..end]
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
