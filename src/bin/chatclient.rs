//! chatclient: connect to a chatserve instance and talk to its operator.

use chatserve::client::{self, ClientError};
use chatserve::config::{ClientConfig, ConfigError};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match ClientConfig::load() {
        Ok(config) => config,
        Err(e @ ConfigError::ClientUsage(_)) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut input = BufReader::new(tokio::io::stdin());
    let mut console = tokio::io::stdout();

    match client::run(&config, &mut input, &mut console).await {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            // Connect failures land after the unterminated "Connecting to..." line.
            if matches!(e, ClientError::Connect(_)) {
                eprintln!();
            }
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
