//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::BusCredentials;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HTTP control API binding (host, port)
    pub server: ServerSettings,

    /// Redis configuration (ingestion channels)
    pub redis: RedisSettings,

    /// Downstream message bus configuration
    pub bus: BusSettings,

    /// Remote coordinator REST configuration
    pub coordinator: CoordinatorSettings,

    /// Session timing and buffering
    pub session: SessionSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,
}

/// Message bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BusSettings {
    /// Bus URL. Falls back to the Redis URL when empty.
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl BusSettings {
    pub fn credentials(&self) -> BusCredentials {
        BusCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Remote coordinator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorSettings {
    /// Base URL of the coordinator REST API
    pub base_url: String,

    /// Bearer token presented on every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl CoordinatorSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Session timing configuration.
///
/// Also constructed directly in tests to shorten intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Buffered events older than this are evicted (default: 300)
    pub buffer_ttl_secs: u64,

    /// How often the buffer cleanup pass runs (default: 30)
    pub cleanup_interval_secs: u64,

    /// Lifetime of a sender binding (default: 60)
    pub binding_ttl_secs: u64,

    /// Heartbeat push interval in milliseconds (default: 30000)
    pub heartbeat_interval_ms: u64,

    /// Size of the recent-event log in status snapshots (default: 50)
    pub recent_event_cap: usize,

    /// Capacity of the live event channel (default: 1024)
    pub live_channel_capacity: usize,

    /// Remote session duration when the request omits one (default: 60)
    pub default_duration_minutes: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            buffer_ttl_secs: 300,
            cleanup_interval_secs: 30,
            binding_ttl_secs: 60,
            heartbeat_interval_ms: 30_000,
            recent_event_cap: 50,
            live_channel_capacity: 1024,
            default_duration_minutes: 60,
        }
    }
}

impl SessionSettings {
    pub fn buffer_ttl(&self) -> Duration {
        Duration::from_secs(self.buffer_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn binding_ttl(&self) -> Duration {
        Duration::from_secs(self.binding_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("session.buffer_ttl_secs", self.buffer_ttl_secs == 0),
            ("session.cleanup_interval_secs", self.cleanup_interval_secs == 0),
            ("session.binding_ttl_secs", self.binding_ttl_secs == 0),
            ("session.heartbeat_interval_ms", self.heartbeat_interval_ms == 0),
            ("session.live_channel_capacity", self.live_channel_capacity == 0),
        ];
        if let Some((key, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::Message(format!("{} must be greater than zero", key)));
        }
        Ok(())
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if a timing value is zero.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("bus.url", "")?
            .set_default("coordinator.request_timeout_secs", 10)?
            .set_default("session.buffer_ttl_secs", 300)?
            .set_default("session.cleanup_interval_secs", 30)?
            .set_default("session.binding_ttl_secs", 60)?
            .set_default("session.heartbeat_interval_ms", 30_000_i64)?
            .set_default("session.recent_event_cap", 50)?
            .set_default("session.live_channel_capacity", 1024)?
            .set_default("session.default_duration_minutes", 60)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__SESSION__BUFFER_TTL_SECS=120 -> session.buffer_ttl_secs = 120
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("bus.url", std::env::var("BUS_URL").ok())?
            .set_override_option("coordinator.base_url", std::env::var("COORDINATOR_URL").ok())?
            .set_override_option(
                "coordinator.api_key",
                std::env::var("COORDINATOR_API_KEY").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|mut settings: Self| {
                if settings.coordinator.base_url.trim().is_empty() {
                    return Err(ConfigError::Message(
                        "coordinator.base_url must not be empty".into(),
                    ));
                }
                if settings.bus.url.trim().is_empty() {
                    settings.bus.url = settings.redis.url.clone();
                }
                settings.session.validate()?;
                Ok(settings)
            })
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
