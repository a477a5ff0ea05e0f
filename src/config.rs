// src/config.rs
//! Configuration loaded from environment variables (a `.env` file is read
//! first when present).
//!
//! - `DATABASE_URL` - PostgreSQL connection string (required)
//! - `HOST` - bind address (default: 127.0.0.1)
//! - `PORT` - first port to try (default: 3000)
//! - `DATABASE_MAX_CONNECTIONS` - pool size (default: 5)
//! - `CORS_ORIGIN` - allowed origin; any origin when unset

use std::net::IpAddr;

use thiserror::Error;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub max_connections: u32,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Config {
            database_url,
            host: parse_or(&lookup, "HOST", IpAddr::from([127, 0, 0, 1]))?,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            cors_origin: lookup("CORS_ORIGIN").filter(|v| !v.trim().is_empty()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_unset() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/stockroom")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host.to_string(), "127.0.0.1");
        assert_eq!(cfg.max_connections, 5);
        assert!(cfg.cors_origin.is_none());
    }

    #[test]
    fn database_url_is_required() {
        let err = config(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
        assert_eq!(err.to_string(), "DATABASE_URL must be set");
    }

    #[test]
    fn invalid_port_is_reported() {
        let err = config(&[("DATABASE_URL", "postgres://x"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
        assert_eq!(err.to_string(), "PORT has an invalid value: eighty");
    }
}
