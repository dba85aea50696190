//! Configuration loading and types for distfiles.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct, then selected settings are overridden from the
//! environment:
//!
//! - `AUTH_TOKENS` -- comma-separated accepted upload tokens
//! - `DISTFILES_BASEDIR` -- root of the distfiles tree
//!
//! The file path comes from `--config` or, failing that, `DISTFILES_CONFIG`.
//! With neither, built-in defaults are used.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const ENV_CONFIG: &str = "DISTFILES_CONFIG";
/// Environment variable overriding `auth.tokens`.
pub const ENV_AUTH_TOKENS: &str = "AUTH_TOKENS";
/// Environment variable overriding `storage.basedir`.
pub const ENV_BASEDIR: &str = "DISTFILES_BASEDIR";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upload token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Distfiles tree settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Upload token settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Accepted tokens, matched against the Basic-auth username.
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Distfiles tree configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the tree. Defaults to the working directory.
    #[serde(default = "default_basedir")]
    pub basedir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            basedir: default_basedir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_basedir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse configuration from YAML text.  An empty document yields defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

/// Resolve the config source and apply environment overrides.
///
/// `path` is the `--config` flag; when absent, `DISTFILES_CONFIG` is
/// consulted.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let env_path = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
    let mut config = match path.map(Path::to_path_buf).or(env_path) {
        Some(p) => load_config(&p)
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", p.display(), e))?,
        None => Config::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

impl Config {
    /// Override settings from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tokens) = lookup(ENV_AUTH_TOKENS) {
            self.auth.tokens = split_tokens(&tokens);
        }
        if let Some(basedir) = lookup(ENV_BASEDIR).filter(|s| !s.is_empty()) {
            self.storage.basedir = PathBuf::from(basedir);
        }
    }
}

/// Split a comma-separated token list, trimming blanks.
pub fn split_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// -- Tests -------------------------------------------------------------------
