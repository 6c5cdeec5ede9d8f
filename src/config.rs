use crate::error::{AppResult, ConfigErrorKind, InfraError};
use std::path::PathBuf;

/// Quota granted to a client the first time its IP is seen, in bytes.
pub const DEFAULT_QUOTA: i64 = 1_526_260;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the TCP listener binds to
    pub listen_addr: String,
    /// Root directory holding one namespace directory per client IP
    pub data_root: PathBuf,
    /// Path of the JSON client registry file
    pub registry_path: PathBuf,
    /// Quota assigned to newly seen clients, in bytes
    pub default_quota: i64,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        // Load .env if present; real env vars win.
        dotenvy::dotenv().ok();

        Ok(Self {
            listen_addr: env_or("IPSTASH_LISTEN_ADDR", "0.0.0.0:12345"),
            data_root: PathBuf::from(env_or("IPSTASH_DATA_ROOT", "server_data")),
            registry_path: PathBuf::from(env_or("IPSTASH_REGISTRY_PATH", "clients.json")),
            default_quota: env_parsed("IPSTASH_DEFAULT_QUOTA", DEFAULT_QUOTA)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| {
            InfraError::Config {
                source: ConfigErrorKind::InvalidEnv(key.to_string(), raw),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}
