use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use murmur_api::ApiError;
use murmur_api::tokens::{TokenSecrets, TokenTtls};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub refresh_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Base of the links in verification emails.
    pub public_url: String,
    pub store_timeout: Duration,
    pub reconcile_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            jwt_secret: required_secret(&lookup, "MURMUR_JWT_SECRET")?,
            refresh_secret: required_secret(&lookup, "MURMUR_REFRESH_SECRET")?,
            db_path: PathBuf::from(var("MURMUR_DB_PATH", "murmur.db")),
            host: var("MURMUR_HOST", "0.0.0.0"),
            port: parse(&lookup, "MURMUR_PORT", 3000)?,
            public_url: var("MURMUR_PUBLIC_URL", "http://localhost:3000"),
            store_timeout: Duration::from_millis(parse(&lookup, "MURMUR_STORE_TIMEOUT_MS", 5000)?),
            reconcile_interval: Duration::from_secs(
                parse::<u64>(&lookup, "MURMUR_RECONCILE_INTERVAL_SECS", 60)?.max(1),
            ),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ApiError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ApiError::Config(format!("bad bind address {}:{}: {}", self.host, self.port, e)))
    }

    pub fn token_secrets(&self) -> TokenSecrets {
        TokenSecrets {
            access: Some(self.jwt_secret.clone()),
            refresh: Some(self.refresh_secret.clone()),
        }
    }

    pub fn token_ttls(&self) -> TokenTtls {
        TokenTtls::default()
    }
}

fn required_secret(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ApiError> {
    match lookup(key) {
        Some(secret) if !secret.trim().is_empty() && !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => {
            Ok(secret)
        }
        _ => Err(ApiError::Config(format!("{} is unset or still a placeholder", key))),
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ApiError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ApiError::Config(format!("{} is not a valid value: {:?}", key, raw))),
        None => Ok(default),
    }
}
