//! Configuration module for the relay.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Smallest listen backlog the relay will request.
pub const MIN_BACKLOG: i32 = 10;

/// Command-line arguments for the relay server
#[derive(Parser, Debug)]
#[command(name = "line-relay")]
#[command(author = "line-relay authors")]
#[command(version = "0.1.0")]
#[command(about = "Fans newline-terminated frames out to every other connected client", long_about = None)]
pub struct CliArgs {
    /// Address to bind to (`*` for any interface)
    pub bind_address: String,

    /// Port number or service name to listen on
    pub port: String,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen backlog (at least 10)
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Bytes read from a client per read call
    #[arg(long)]
    pub read_chunk: Option<usize>,

    /// Readiness events handled per poll
    #[arg(long)]
    pub max_events: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backlog: default_backlog(),
            read_chunk: default_read_chunk(),
            max_events: default_max_events(),
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

fn default_backlog() -> i32 {
    MIN_BACKLOG
}

fn default_read_chunk() -> usize {
    1024
}

fn default_max_events() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub backlog: i32,
    pub read_chunk: usize,
    pub max_events: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Config {
            host: cli.bind_address,
            port: cli.port,
            backlog: cli
                .backlog
                .unwrap_or(toml_config.server.backlog)
                .max(MIN_BACKLOG),
            read_chunk: cli
                .read_chunk
                .unwrap_or(toml_config.server.read_chunk)
                .max(1),
            max_events: cli
                .max_events
                .unwrap_or(toml_config.server.max_events)
                .max(1),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Defaults for the given address, without touching the command line.
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        let server = ServerConfig::default();
        Config {
            host: host.into(),
            port: port.into(),
            backlog: server.backlog,
            read_chunk: server.read_chunk,
            max_events: server.max_events,
            log_level: default_log_level(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.backlog, 10);
        assert_eq!(config.server.read_chunk, 1024);
        assert_eq!(config.server.max_events, 64);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_positional_args_required() {
        assert!(CliArgs::try_parse_from(["line-relay"]).is_err());
        assert!(CliArgs::try_parse_from(["line-relay", "127.0.0.1"]).is_err());
        assert!(CliArgs::try_parse_from(["line-relay", "a", "1", "extra"]).is_err());

        let config = Config::from_args(parse(&["line-relay", "127.0.0.1", "4242"])).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, "4242");
        assert_eq!(config.backlog, 10);
    }

    #[test]
    fn test_backlog_floor() {
        let config =
            Config::from_args(parse(&["line-relay", "*", "0", "--backlog", "3"])).unwrap();
        assert_eq!(config.backlog, MIN_BACKLOG);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            backlog = 128
            read_chunk = 4096

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.server.read_chunk, 4096);
        assert_eq!(config.server.max_events, 64);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbacklog = 50\nread_chunk = 2048\n[logging]\nlevel = \"warn\"").unwrap();
        let path = file.path().to_str().unwrap();

        let config = Config::from_args(parse(&[
            "line-relay",
            "localhost",
            "9000",
            "--config",
            path,
            "--read-chunk",
            "512",
        ]))
        .unwrap();
        assert_eq!(config.backlog, 50);
        assert_eq!(config.read_chunk, 512);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_bad_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nbacklog = ").unwrap();
        let path = file.path().to_str().unwrap();

        let err = Config::from_args(parse(&["line-relay", "*", "1", "-c", path])).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(..)));
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }
}
