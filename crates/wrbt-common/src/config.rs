//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Initialize the global configuration from environment.
///
/// Should be called once at application startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let app_config = load()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

/// Build the configuration without installing it globally.
pub fn load() -> Result<AppConfig, config::ConfigError> {
    let cfg = config::Config::builder()
        // Defaults
        .set_default("environment", "production")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.max_connections", 20)?
        .set_default("database.min_connections", 2)?
        .set_default("storage.timeout_ms", 5_000)?
        .set_default("auth.jwt_secret", "")?
        .set_default("auth.hashing.mode", "argon2")?
        .set_default("auth.hashing.argon2_memory_kib", 19_456)?
        .set_default("auth.hashing.argon2_iterations", 2)?
        .set_default("auth.hashing.argon2_parallelism", 1)?
        .set_default("auth.pairing_code_length", 8)?
        .set_default("auth.pairing_ttl_secs", 3_600)? // 1 hour
        .set_default("rate_limits.register.max_requests", 3)?
        .set_default("rate_limits.register.window_secs", 3_600)?
        .set_default("rate_limits.status.max_requests", 60)?
        .set_default("rate_limits.status.window_secs", 3_600)?
        .set_default("network.trust_forwarded_for", false)?
        .set_default("log.json", false)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (WRBT__SERVER__PORT, WRBT__DATABASE__URL, etc.)
        .add_source(
            config::Environment::with_prefix("WRBT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub rate_limits: RateLimitsConfig,
    pub network: NetworkConfig,
    pub log: LogConfig,
}

/// Deployment environment. Only `development` may relax secret hashing.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Optional; omit for lite / in-process-only mode.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    /// Redis connection URL for shared rate-limit counters.
    /// Omit for single-instance deployments (in-process counters).
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Upper bound on any single registry or audit-log call.
    pub timeout_ms: u64,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 secret used to verify admin console JWTs. Should be 256+ bits of entropy
    pub jwt_secret: String,
    pub hashing: HashingConfig,
    /// Pairing code length (6–8 letters)
    pub pairing_code_length: usize,
    /// Pairing code lifetime in seconds
    pub pairing_ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashingMode {
    Argon2,
    Plaintext,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HashingConfig {
    pub mode: HashingMode,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitsConfig {
    pub register: RateLimitConfig,
    pub status: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy).
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Emit JSON log lines instead of human-readable text.
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_lite_production_deployment() {
        let config = load().unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(config.database.url.is_none());
        assert!(config.redis.url.is_none());
        assert_eq!(config.storage.timeout(), Duration::from_secs(5));
        assert_eq!(config.auth.hashing.mode, HashingMode::Argon2);
        assert_eq!(config.auth.pairing_code_length, 8);
        assert_eq!(config.rate_limits.register.max_requests, 3);
        assert_eq!(config.rate_limits.status.max_requests, 60);
        assert!(!config.network.trust_forwarded_for);
    }
}
