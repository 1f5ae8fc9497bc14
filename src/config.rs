//! Configuration module for debugd.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::{DEFAULT_PORT, PREFIX};

/// Command-line arguments for the relay
#[derive(Parser, Debug)]
#[command(name = "debugd")]
#[command(author = "debugd authors")]
#[command(version = "0.1.0")]
#[command(about = "Receives profiles over TCP and opens them in a viewer", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:59336)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Viewer executable invoked with the artifact path
    #[arg(short = 'v', long)]
    pub viewer: Option<PathBuf>,

    /// Extra argument passed to the viewer before the artifact path (repeatable)
    #[arg(long = "viewer-arg", allow_hyphen_values = true)]
    pub viewer_args: Vec<String>,

    /// Directory artifacts are written to (defaults to the system temp dir)
    #[arg(short = 'd', long)]
    pub artifact_dir: Option<PathBuf>,

    /// Maximum request size in bytes, header and terminator included
    #[arg(short = 'm', long)]
    pub max_request_size: Option<usize>,

    /// How connections are scheduled
    #[arg(long, value_enum)]
    pub mode: Option<ServeMode>,

    /// Maximum connections handled at once in concurrent mode
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Connection scheduling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Handle one connection at a time inside the accept loop
    #[default]
    Sequential,
    /// Handle each connection on its own task
    Concurrent,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Connection scheduling strategy
    #[serde(default)]
    pub mode: ServeMode,
    /// Concurrent connection cap
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum request size in bytes
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            mode: ServeMode::default(),
            max_connections: default_max_connections(),
            max_request_size: default_max_request_size(),
        }
    }
}

/// Artifact and viewer configuration
#[derive(Debug, Deserialize)]
pub struct DispatchConfig {
    /// Viewer executable
    #[serde(default = "default_viewer")]
    pub viewer: PathBuf,
    /// Arguments placed before the artifact path
    #[serde(default)]
    pub viewer_args: Vec<String>,
    /// Artifact directory
    pub artifact_dir: Option<PathBuf>,
    /// Artifact file name prefix
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
    /// Artifact file name suffix
    #[serde(default = "default_artifact_suffix")]
    pub artifact_suffix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            viewer: default_viewer(),
            viewer_args: Vec::new(),
            artifact_dir: None,
            artifact_prefix: default_artifact_prefix(),
            artifact_suffix: default_artifact_suffix(),
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

fn default_listen() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

fn default_max_connections() -> usize {
    64
}

fn default_max_request_size() -> usize {
    64 * 1024 * 1024 // 64 MB
}

fn default_viewer() -> PathBuf {
    PathBuf::from("speedscope")
}

fn default_artifact_prefix() -> String {
    "profile-".to_string()
}

fn default_artifact_suffix() -> String {
    ".txt".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub mode: ServeMode,
    pub max_connections: usize,
    pub max_request_size: usize,
    pub viewer: PathBuf,
    pub viewer_args: Vec<String>,
    pub artifact_dir: Option<PathBuf>,
    pub artifact_prefix: String,
    pub artifact_suffix: String,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence) and check
    /// the result.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let viewer_args = if cli.viewer_args.is_empty() {
            toml_config.dispatch.viewer_args
        } else {
            cli.viewer_args
        };

        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            mode: cli.mode.unwrap_or(toml_config.server.mode),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            max_request_size: cli
                .max_request_size
                .unwrap_or(toml_config.server.max_request_size),
            viewer: cli.viewer.unwrap_or(toml_config.dispatch.viewer),
            viewer_args,
            artifact_dir: cli.artifact_dir.or(toml_config.dispatch.artifact_dir),
            artifact_prefix: toml_config.dispatch.artifact_prefix,
            artifact_suffix: toml_config.dispatch.artifact_suffix,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Header plus terminator must fit, even for an empty payload.
        if self.max_request_size <= PREFIX.len() {
            return Err(ConfigError::Invalid(format!(
                "max_request_size must be larger than {} bytes",
                PREFIX.len()
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.viewer.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("viewer must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
