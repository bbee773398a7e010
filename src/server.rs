//! TCP listener for chat sessions.
//!
//! Accepts one connection at a time and runs its session to completion
//! before accepting the next; the operator console is shared by every
//! session, so conversations cannot overlap.

use crate::config::Config;
use crate::console::write_line;
use crate::session::Session;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::net::{lookup_host, TcpListener};
use tracing::{debug, error, info, warn};

/// Pending connection queue length for the listening socket.
const LISTEN_BACKLOG: i32 = 128;

/// Pause after a failed accept so persistent errors (EMFILE) don't spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    name: String,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let addr = lookup_host((config.bind_host(), config.port))
            .await
            .map_err(ServerError::Bind)?
            .next()
            .ok_or_else(|| {
                ServerError::Bind(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address found for '{}'", config.bind_host()),
                ))
            })?;

        let listener = create_listener(addr)
            .and_then(TcpListener::from_std)
            .map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;

        info!(address = %local_addr, name = %config.name, "Server listening");

        Ok(Server {
            listener,
            local_addr,
            name: config.name.clone(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve sessions until `shutdown` resolves.
    ///
    /// Session failures are logged and the next connection is accepted.
    /// Shutdown is honoured both while waiting to accept and mid-session.
    pub async fn serve<I, O, F>(
        self,
        input: &mut I,
        console: &mut O,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        write_line(console, "Waiting for connections...\n")
            .await
            .map_err(ServerError::Console)?;

        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tokio::select! {
                            _ = &mut shutdown => break,
                            _ = pause_after_accept_error(&e) => continue,
                        }
                    }
                },
            };

            debug!(peer = %peer, "New connection");
            let session = Session::new(stream, self.name.as_str());

            tokio::select! {
                _ = &mut shutdown => {
                    info!(peer = %peer, "Interrupted during session");
                    break;
                }
                result = session.run(&mut *input, &mut *console) => match result {
                    Ok(reason) => info!(peer = %peer, ?reason, "Session ended"),
                    Err(e) => warn!(peer = %peer, error = %e, "Session failed"),
                },
            }
        }

        write_line(console, "\nInterrupt received, halting program.")
            .await
            .map_err(ServerError::Console)?;

        drop(self.listener);
        info!(address = %self.local_addr, "Listener closed");
        Ok(())
    }
}

async fn pause_after_accept_error(e: &io::Error) {
    error!(error = %e, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Create a non-blocking listening socket with SO_REUSEADDR so a restarted
/// server can rebind while old conversations sit in TIME_WAIT.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Listener errors
#[derive(Debug)]
pub enum ServerError {
    /// The listening socket could not be created.
    Bind(io::Error),
    /// Writing to the operator console failed.
    Console(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ServerError::Console(e) => write!(f, "Console error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind(e) | ServerError::Console(e) => Some(e),
        }
    }
}
