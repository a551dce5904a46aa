//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Paths served by the server itself; applications may not claim them.
pub const RESERVED_PATHS: [&str; 5] = ["/ping", "/health", "/metrics", "/caches", "/clearCaches"];

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache eviction settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// One entry per webhook endpoint.
    #[serde(default = "default_applications")]
    pub applications: Vec<ApplicationConfig>,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Production mode hides diagnostic endpoints and error details.
    #[serde(default)]
    pub production: bool,
}

/// Age-based eviction of the function caches.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Minutes between purge sweeps. Zero disables the sweep.
    #[serde(default = "default_purge_interval_minutes")]
    pub purge_interval_minutes: u64,

    /// Entries older than this many minutes are evicted by a sweep.
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voxhook_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// One webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationConfig {
    /// Path the platform POSTs to.
    #[serde(default = "default_server_path")]
    pub server_path: String,

    /// Expected `x-vapi-secret` value. Empty disables the check.
    #[serde(default)]
    pub secret: String,

    /// Drop the session's cache entries when its end-of-call report arrives.
    #[serde(default = "default_true")]
    pub remove_cache_on_end_of_call_report: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_purge_interval_minutes() -> u64 {
    30
}

fn default_max_age_minutes() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_path() -> String {
    "/vapi".to_string()
}

fn default_true() -> bool {
    true
}

fn default_applications() -> Vec<ApplicationConfig> {
    vec![ApplicationConfig::default()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            applications: default_applications(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            production: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            purge_interval_minutes: default_purge_interval_minutes(),
            max_age_minutes: default_max_age_minutes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            server_path: default_server_path(),
            secret: String::new(),
            remove_cache_on_end_of_call_report: true,
        }
    }
}

impl CacheConfig {
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_minutes.saturating_mul(60))
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_minutes.saturating_mul(60))
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An application definition is unusable.
    #[error("invalid application `{path}`: {reason}")]
    InvalidApplication { path: String, reason: String },
}

/// Checks that every application path is absolute, unique, and not one of
/// the server's own routes.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidApplication`] for the first offending path.
pub fn validate_applications<'a>(
    applications: impl IntoIterator<Item = &'a ApplicationConfig>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for app in applications {
        let invalid = |reason: &str| ConfigError::InvalidApplication {
            path: app.server_path.clone(),
            reason: reason.to_string(),
        };
        if !app.server_path.starts_with('/') || app.server_path.len() < 2 {
            return Err(invalid("server path must start with '/' and name a route"));
        }
        if RESERVED_PATHS.contains(&app.server_path.as_str()) {
            return Err(invalid("server path collides with a built-in route"));
        }
        if !seen.insert(app.server_path.as_str()) {
            return Err(invalid("server path is declared more than once"));
        }
    }
    Ok(())
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOXHOOK_HOST` overrides `server.host`
/// - `VOXHOOK_PORT` overrides `server.port`
/// - `VOXHOOK_PRODUCTION` overrides `server.production` (set to "true" to enable)
/// - `VOXHOOK_PURGE_INTERVAL_MINUTES` overrides `cache.purge_interval_minutes`
/// - `VOXHOOK_MAX_AGE_MINUTES` overrides `cache.max_age_minutes`
/// - `VOXHOOK_LOG_LEVEL` overrides `logging.level`
/// - `VOXHOOK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VOXHOOK_SECRET` fills `secret` for every application that has none
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the resulting application list is invalid.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_applications(&config.applications)?;

    Ok(config)
}

/// Applies `VOXHOOK_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("VOXHOOK_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("VOXHOOK_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(production) = lookup("VOXHOOK_PRODUCTION") {
        config.server.production = is_truthy(&production);
    }
    if let Some(minutes) = lookup("VOXHOOK_PURGE_INTERVAL_MINUTES") {
        if let Ok(parsed) = minutes.parse() {
            config.cache.purge_interval_minutes = parsed;
        }
    }
    if let Some(minutes) = lookup("VOXHOOK_MAX_AGE_MINUTES") {
        if let Ok(parsed) = minutes.parse() {
            config.cache.max_age_minutes = parsed;
        }
    }
    if let Some(level) = lookup("VOXHOOK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOXHOOK_LOG_JSON") {
        config.logging.json = is_truthy(&json);
    }
    if let Some(secret) = lookup("VOXHOOK_SECRET") {
        for app in config.applications.iter_mut().filter(|a| a.secret.is_empty()) {
            app.secret = secret.clone();
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}
