//! chatserve: a one-to-one TCP chat
//!
//! A listener accepts one client at a time, swaps display names with it,
//! then alternates between showing the client's message and sending the
//! operator's reply until either side says `bye`.
//!
//! Features:
//! - Name handshake over an unframed byte stream
//! - Strict receive-then-send turn taking
//! - Session failures are isolated; the listener keeps accepting
//! - Companion client speaking the same protocol
//! - Configuration via CLI arguments or TOML file

pub mod client;
pub mod config;
pub mod console;
pub mod protocol;
pub mod server;
pub mod session;
