//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use url::Url;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Federation configuration.
    #[serde(default)]
    pub federation: FederationConfig,
    /// Delivery retry configuration.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance. Local actor IRIs are minted under it.
    pub url: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Parse the public URL.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.url)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`postgres://` or `sqlite:`).
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Whether outbound delivery is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of concurrent deliveries per fan-out.
    #[serde(default = "default_delivery_concurrency")]
    pub delivery_concurrency: usize,
    /// Hours after which a cached remote actor is refetched.
    #[serde(default = "default_actor_refresh_hours")]
    pub actor_refresh_hours: i64,
    /// Timeout for outbound HTTP requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// User agent sent with outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delivery_concurrency: default_delivery_concurrency(),
            actor_refresh_hours: default_actor_refresh_hours(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Delivery retry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Attempts before a task is marked dead.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    /// Upper bound on the retry delay.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// How often the retry worker polls for due tasks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Tasks claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            multiplier: default_multiplier(),
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_true() -> bool {
    true
}

const fn default_delivery_concurrency() -> usize {
    16
}

const fn default_actor_refresh_hours() -> i64 {
    24
}

const fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("fedigraph/", env!("CARGO_PKG_VERSION")).to_string()
}

const fn default_max_attempts() -> i32 {
    5
}

const fn default_initial_delay_secs() -> u64 {
    60
}

const fn default_max_delay_secs() -> u64 {
    86400
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_poll_interval_secs() -> u64 {
    30
}

const fn default_batch_size() -> u64 {
    100
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `FEDIGRAPH_ENV`)
    /// 3. Environment variables with `FEDIGRAPH__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("FEDIGRAPH_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(environment())
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        config.try_deserialize()
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("FEDIGRAPH")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
