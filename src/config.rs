//! Cache configuration section.
//!
//! [`CacheConfig`] is the shape an application config loader fills in,
//! either through serde or from `CACHE_*` environment variables.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `CACHE_TYPE` | `type` | `memory` |
//! | `CACHE_TTL` | `ttl` | none |
//! | `CACHE_CONNECTION` | `connection` | empty |
//! | `CACHE_PASSWORD` / `CACHE_PASSWORD_FILE` | `password` | empty |
//! | `CACHE_KEY_PREFIX` | `key_prefix` | empty |
//!
//! TTLs accept a bare number of seconds (`"30"`) or unit-suffixed parts
//! (`"500ms"`, `"5m"`, `"1h30m"`).

use crate::connection::validate_connection_string;
use crate::error::{Error, Result};
use crate::options::{CacheOptions, CacheType};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Cache configuration section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    #[serde(deserialize_with = "deserialize_ttl")]
    pub ttl: Duration,
    #[serde(rename = "connection")]
    pub connection_string: String,
    pub password: String,
    pub key_prefix: String,
}

impl CacheConfig {
    /// Load the section from `CACHE_*` environment variables.
    ///
    /// # Errors
    /// Returns `Error::UnsupportedCacheType` or `Error::ConfigError` for
    /// unparsable values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the section through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = CacheConfig::default();
        if let Some(cache_type) = var("CACHE_TYPE") {
            config.cache_type = cache_type.parse()?;
        }
        if let Some(ttl) = var("CACHE_TTL") {
            config.ttl = parse_ttl(&ttl)?;
        }
        if let Some(connection) = var("CACHE_CONNECTION") {
            config.connection_string = connection;
        }
        match var("CACHE_PASSWORD") {
            Some(password) => config.password = password,
            None => {
                if let Some(path) = var("CACHE_PASSWORD_FILE") {
                    config.password = read_secret(&path)?;
                }
            }
        }
        if let Some(key_prefix) = var("CACHE_KEY_PREFIX") {
            config.key_prefix = key_prefix;
        }

        debug!("✓ Cache config loaded: {:?}", config.redacted());
        Ok(config)
    }

    /// Check the connection string against the cache type.
    ///
    /// # Errors
    /// Returns the connection string validation error.
    pub fn validate(&self) -> Result<()> {
        validate_connection_string(self.cache_type, &self.connection_string)
    }

    /// Convert into registry options. Empty values keep the option defaults.
    pub fn into_options(self) -> CacheOptions {
        let mut options = CacheOptions::new(self.cache_type);
        if !self.ttl.is_zero() {
            options = options.with_ttl(self.ttl);
        }
        if !self.connection_string.is_empty() {
            options = options.with_connection_string(self.connection_string);
        }
        if !self.password.is_empty() {
            options = options.with_connection_password(self.password);
        }
        if !self.key_prefix.is_empty() {
            options = options.with_key_prefix(self.key_prefix);
        }
        options
    }

    fn redacted(&self) -> CacheConfig {
        CacheConfig {
            password: if self.password.is_empty() {
                String::new()
            } else {
                "***".to_string()
            },
            ..self.clone()
        }
    }
}

fn read_secret(path: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|content| content.trim().to_string())
        .map_err(|e| Error::ConfigError(format!("failed to read secret {}: {}", path, e)))
}

/// Parse a TTL such as `"30"`, `"500ms"` or `"1h30m"`.
///
/// # Errors
/// Returns `Error::ConfigError` for malformed input.
pub fn parse_ttl(input: &str) -> Result<Duration> {
    let s = input.trim();
    let bad = || Error::ConfigError(format!("invalid ttl: {:?}", input));

    if s.is_empty() {
        return Err(bad());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(bad)?;
        if digits == 0 {
            return Err(bad());
        }
        let amount: u64 = rest[..digits].parse().map_err(|_| bad())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ns" => Duration::from_nanos(amount),
            "us" | "µs" => Duration::from_micros(amount),
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.saturating_mul(60)),
            "h" => Duration::from_secs(amount.saturating_mul(3600)),
            _ => return Err(bad()),
        };
        total = total.saturating_add(part);
        rest = &rest[unit_len..];
    }
    Ok(total)
}

fn deserialize_ttl<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_ttl(&text).map_err(serde::de::Error::custom),
    }
}
