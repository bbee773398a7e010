//! Configuration for the chat server and client.
//!
//! The server supports both command-line arguments and a TOML configuration
//! file. CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Display name announced to peers when none is configured.
pub const DEFAULT_NAME: &str = "notHAL";

/// Command-line arguments for the chat server
#[derive(Parser, Debug)]
#[command(name = "chatserve")]
#[command(author = "chatserve authors")]
#[command(version = "0.1.0")]
#[command(about = "A one-to-one TCP chat server", long_about = None)]
pub struct CliArgs {
    /// Port to listen on (1-65535)
    pub port: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (empty for all interfaces)
    #[arg(long)]
    pub host: Option<String>,

    /// Display name sent to connecting clients
    #[arg(short, long)]
    pub name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Deserialize, Default)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default)]
    pub host: String,
    /// Port to listen on
    pub port: Option<u16>,
}

/// Per-conversation configuration
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Local display name
    #[serde(default = "default_name")]
    pub name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

// Diagnostics share the terminal with the chat transcript.
fn default_log_level() -> String {
    "warn".to_string()
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse(), &program_name("chatserve"))
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_cli(cli: CliArgs, program: &str) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let port = match cli.port {
            Some(ref arg) => parse_port(arg),
            None => toml_config.server.port.filter(|&p| p != 0),
        }
        .ok_or_else(|| ConfigError::Usage(program.to_string()))?;

        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port,
            name: cli.name.unwrap_or(toml_config.session.name),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }

    /// Host part of the bind address; empty means all interfaces.
    pub fn bind_host(&self) -> &str {
        if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        }
    }
}

/// Command-line arguments for the chat client
#[derive(Parser, Debug)]
#[command(name = "chatclient")]
#[command(author = "chatserve authors")]
#[command(version = "0.1.0")]
#[command(about = "Connect to a chatserve instance", long_about = None)]
pub struct ClientArgs {
    /// Host running the chat server
    pub hostname: Option<String>,

    /// Port the chat server listens on
    pub port: Option<String>,

    /// Username (skips the interactive prompt)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Final resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub name: Option<String>,
    pub log_level: String,
}

impl ClientConfig {
    /// Load client configuration from CLI args.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(ClientArgs::parse(), &program_name("chatclient"))
    }

    pub fn from_cli(cli: ClientArgs, program: &str) -> Result<Self, ConfigError> {
        let usage = || ConfigError::ClientUsage(program.to_string());
        let host = cli.hostname.ok_or_else(usage)?;
        let port = cli.port.as_deref().and_then(parse_port).ok_or_else(usage)?;

        Ok(ClientConfig {
            host,
            port,
            name: cli.name,
            log_level: cli.log_level,
        })
    }
}

/// Parse a TCP port, rejecting 0 and anything outside u16.
fn parse_port(arg: &str) -> Option<u16> {
    arg.trim().parse::<u16>().ok().filter(|&p| p != 0)
}

fn program_name(fallback: &str) -> String {
    std::env::args().next().unwrap_or_else(|| fallback.to_string())
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// Server port missing or invalid; carries the program name.
    Usage(String),
    /// Client host or port missing or invalid; carries the program name.
    ClientUsage(String),
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Usage(program) => {
                write!(f, "ERROR: Proper usage is {} port", program)
            }
            ConfigError::ClientUsage(program) => {
                write!(f, "USAGE: {} hostname port", program)
            }
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
