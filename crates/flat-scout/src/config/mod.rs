use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::workflows::monitoring::{InitDataVerifier, MonitorSettings, DEFAULT_INIT_DATA_MAX_AGE};

/// Seen-listing rows younger than this are never pruned.
pub const MIN_RETENTION_DAYS: u32 = 30;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub monitor: MonitorConfig,
    pub webapp: WebAppConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let monitor = MonitorConfig::from_env()?;
        let webapp = WebAppConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            monitor,
            webapp,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Colored output; only enabled for local development.
    pub ansi: bool,
}

/// Scheduling, fetching and retention knobs for the monitoring loop.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub source_timeout: Duration,
    pub search_pages: u32,
    pub retention_days: u32,
    /// SQLite file backing filters and delivery state. `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            source_timeout: Duration::from_secs(30),
            search_pages: 2,
            retention_days: MIN_RETENTION_DAYS,
            db_path: None,
        }
    }
}

impl MonitorConfig {
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            search_pages: self.search_pages,
            source_timeout: self.source_timeout,
        }
    }

    /// Delivery records sent before this instant may be pruned.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.retention_days))
    }

    fn from_env() -> Result<Self, ConfigError> {
        let interval_minutes = parse_var("MONITOR_INTERVAL_MINUTES", 5u64)?;
        if interval_minutes == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "MONITOR_INTERVAL_MINUTES",
            });
        }
        let timeout_secs = parse_var("MONITOR_SOURCE_TIMEOUT_SECS", 30u64)?;
        let search_pages = parse_var("MONITOR_SEARCH_PAGES", 2u32)?;
        let retention_days = parse_var("MONITOR_RETENTION_DAYS", MIN_RETENTION_DAYS)?;
        if retention_days < MIN_RETENTION_DAYS {
            return Err(ConfigError::RetentionTooShort {
                days: retention_days,
            });
        }

        let db_path = env::var("MONITOR_DB_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            interval: Duration::from_secs(interval_minutes * 60),
            source_timeout: Duration::from_secs(timeout_secs),
            search_pages: search_pages.max(1),
            retention_days,
            db_path,
        })
    }
}

/// Mini App authentication for the filter API.
#[derive(Clone, PartialEq)]
pub struct WebAppConfig {
    /// Token of the bot that launches the Mini App. Without it the filter API stays off.
    pub bot_token: Option<String>,
    pub init_data_max_age: Duration,
}

impl fmt::Debug for WebAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebAppConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("init_data_max_age", &self.init_data_max_age)
            .finish()
    }
}

impl Default for WebAppConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            init_data_max_age: DEFAULT_INIT_DATA_MAX_AGE,
        }
    }
}

impl WebAppConfig {
    pub fn verifier(&self) -> Option<InitDataVerifier> {
        self.bot_token
            .as_deref()
            .map(|token| InitDataVerifier::new(token).with_max_age(self.init_data_max_age))
    }

    fn from_env() -> Result<Self, ConfigError> {
        let bot_token = env::var("BOT_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let max_age_secs = parse_var(
            "WEBAPP_INIT_DATA_MAX_AGE_SECS",
            DEFAULT_INIT_DATA_MAX_AGE.as_secs(),
        )?;

        Ok(Self {
            bot_token,
            init_data_max_age: Duration::from_secs(max_age_secs),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    RetentionTooShort { days: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a positive integer")
            }
            ConfigError::RetentionTooShort { days } => write!(
                f,
                "MONITOR_RETENTION_DAYS must be at least {MIN_RETENTION_DAYS} (got {days})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::RetentionTooShort { .. } => None,
        }
    }
}
