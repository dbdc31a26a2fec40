//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres event store when set, in-memory otherwise.
    pub database_url: Option<String>,
    pub log_format: LogFormat,
    /// Capacity of the SSE broadcast channel.
    pub realtime_buffer: usize,
    /// Tax rate applied to new invoices when the request names none.
    pub default_tax_bps: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            database_url: None,
            log_format: LogFormat::Json,
            realtime_buffer: 1024,
            default_tax_bps: 0,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                defaults.jwt_secret
            }
        };

        Ok(Self {
            bind_addr: parse(&get, "BIND_ADDR", defaults.bind_addr)?,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            log_format: parse(&get, "LOG_FORMAT", defaults.log_format)?,
            realtime_buffer: parse(&get, "REALTIME_BUFFER", defaults.realtime_buffer)?,
            default_tax_bps: parse(&get, "DEFAULT_TAX_BPS", defaults.default_tax_bps)?,
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(config(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/tradeflow"),
            ("LOG_FORMAT", "pretty"),
            ("REALTIME_BUFFER", "64"),
            ("DEFAULT_TAX_BPS", "1100"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/tradeflow"));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.realtime_buffer, 64);
        assert_eq!(cfg.default_tax_bps, 1100);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = config(&[("REALTIME_BUFFER", "lots")]).unwrap_err();
        assert_eq!(err, ConfigError::Invalid { key: "REALTIME_BUFFER", value: "lots".into() });
        assert!(config(&[("LOG_FORMAT", "xml")]).is_err());
    }
}
