//! Process configuration, read once from the environment at startup.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use khata_core::BusinessZone;
use khata_observability::LogFormat;

use crate::retry::RetryPolicy;

const DEV_JWT_SECRET: &str = "dev-secret";
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Deployment target for the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown environment '{value}' (expected 'dev' or 'prod')")]
    UnknownEnvironment { value: String },
    #[error("missing environment variable {key}")]
    MissingEnv { key: String },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub business_zone: BusinessZone,
    pub store_retry: RetryPolicy,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database_url.as_ref().map(|_| "postgres"))
            .field("db_max_connections", &self.db_max_connections)
            .field("business_zone", &self.business_zone)
            .field("store_retry", &self.store_retry)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env = match get("KHATA_ENV") {
            Some(v) => v.parse()?,
            None => Environment::default(),
        };

        let jwt_secret = match (get("KHATA_JWT_SECRET"), env) {
            (Some(secret), _) => secret,
            (None, Environment::Dev) => DEV_JWT_SECRET.to_string(),
            (None, Environment::Prod) => {
                return Err(ConfigError::MissingEnv {
                    key: "KHATA_JWT_SECRET".to_string(),
                });
            }
        };

        let retry_attempts: u32 = parse_or(&get, "KHATA_STORE_RETRY_ATTEMPTS", 3)?;
        let retry_base_ms: u64 = parse_or(&get, "KHATA_STORE_RETRY_BASE_MS", 50)?;

        Ok(Self {
            env,
            bind_addr: parse_or(&get, "KHATA_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            db_max_connections: parse_or(&get, "KHATA_DB_MAX_CONNECTIONS", 10)?,
            business_zone: parse_or(&get, "KHATA_BUSINESS_UTC_OFFSET", BusinessZone::utc())?,
            store_retry: RetryPolicy::exponential(
                retry_attempts,
                Duration::from_millis(retry_base_ms),
                MAX_RETRY_DELAY,
            ),
            log_format: parse_or(&get, "KHATA_LOG_FORMAT", LogFormat::default())?,
        })
    }

    /// True when the JWT secret is the built-in development value.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
