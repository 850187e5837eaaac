use anyhow::{Context, Result};
use std::net::SocketAddr;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store connection string (`DATABASE_URL`). A legacy `postgres://`
    /// prefix is normalized when the store is opened.
    pub database_url: String,
    /// Listen address (`PIMS_BIND_ADDR`, default 0.0.0.0:5000).
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .context("DATABASE_URL is not set")?;

        let bind_addr = lookup("PIMS_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .with_context(|| format!("PIMS_BIND_ADDR is not a socket address: {bind_addr}"))?;

        Ok(Self {
            database_url,
            bind_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "sqlite://pims.db")])).unwrap();
        assert_eq!(config.database_url, "sqlite://pims.db");
        assert_eq!(config.bind_addr, "0.0.0.0:5000".parse().unwrap());
    }

    #[test]
    fn test_bind_override() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "pims.db"),
            ("PIMS_BIND_ADDR", "127.0.0.1:8081"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8081);
    }

    #[test]
    fn test_database_url_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "  ")])).is_err());
    }

    #[test]
    fn test_bad_bind_addr() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "pims.db"),
            ("PIMS_BIND_ADDR", "localhost"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PIMS_BIND_ADDR"));
    }
}
