//! chatserve: wait for a client and chat with it from the terminal.

use chatserve::config::{Config, ConfigError};
use chatserve::server::Server;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e @ ConfigError::Usage(_)) => {
            println!("{e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        host = %config.bind_host(),
        port = config.port,
        name = %config.name,
        "Starting chatserve"
    );

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    };

    let mut input = BufReader::new(tokio::io::stdin());
    let mut console = tokio::io::stdout();
    server.serve(&mut input, &mut console, interrupt()).await?;

    // An interrupted session can leave a stdin read parked on a blocking
    // thread, which would keep the runtime from shutting down.
    std::process::exit(0);
}

/// Resolves on Ctrl-C.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}
