//! Error types for the cache registry and its instances.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache registry.
///
/// All cache operations return `Result<T>` where `Result` is defined as `std::result::Result<T, Error>`.
/// Variants fall into four families:
///
/// - configuration: [`Error::UnsupportedCacheType`], [`Error::InvalidConnectionString`],
///   [`Error::ConfigError`]
/// - operational: [`Error::BackendError`], [`Error::SerializationError`],
///   [`Error::DeserializationError`], [`Error::LoaderError`]
/// - state: [`Error::CacheClosed`]
/// - lookup: [`Error::KeyNotFound`], [`Error::CacheNotFound`], [`Error::InvalidCacheType`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The registry or instance was closed.
    ///
    /// Every operation issued after `close()` fails fast with this error.
    CacheClosed,

    /// `pop` found no live value for the key.
    ///
    /// Carries the caller's key (without any namespace prefix).
    KeyNotFound {
        /// Key that was looked up
        key: String,
    },

    /// No instance is registered under the requested name.
    CacheNotFound(String),

    /// An instance exists under the name but holds a different value type.
    InvalidCacheType {
        /// Instance name
        name: String,
        /// Value type requested by the caller
        expected: &'static str,
        /// Value type the instance was created with
        found: &'static str,
    },

    /// The cache type is unknown or its backend was not compiled in.
    UnsupportedCacheType(String),

    /// Connection string failed validation or parsing.
    ///
    /// Common causes:
    /// - Empty connection string for a remote backend
    /// - Wrong scheme for the configured cache type
    /// - Sentinel URL without a master name or without hosts
    /// - Non-numeric `db` parameter
    InvalidConnectionString(String),

    /// Configuration error.
    ///
    /// Raised when a configuration value cannot be interpreted
    /// (for example an unparsable `CACHE_TTL`).
    ConfigError(String),

    /// Serialization failed when converting a value to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a value.
    ///
    /// This indicates the stored bytes were written by a different type
    /// or were corrupted.
    DeserializationError(String),

    /// Backend storage error (Redis connection, pool, protocol).
    ///
    /// Returned verbatim from the store; no retry is attempted.
    BackendError(String),

    /// The loader function failed.
    ///
    /// Loaders may also return any other variant; it is passed through unchanged.
    LoaderError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether this is the typed not-found error returned by `pop`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound { .. })
    }

    /// Whether the operation hit a closed registry or instance.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::CacheClosed)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CacheClosed => write!(f, "cache closed"),
            Error::KeyNotFound { key } => write!(f, "Key '{}' not found in cache", key),
            Error::CacheNotFound(name) => write!(f, "cache not found: {}", name),
            Error::InvalidCacheType {
                name,
                expected,
                found,
            } => write!(
                f,
                "invalid cache type for '{}': expected {}, found {}",
                name, expected, found
            ),
            Error::UnsupportedCacheType(t) => write!(f, "unsupported cache type: {}", t),
            Error::InvalidConnectionString(msg) => {
                write!(f, "invalid connection string: {}", msg)
            }
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::LoaderError(msg) => write!(f, "Loader error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidConnectionString(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for Error {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Error::BackendError(format!("Failed to get Redis connection: {}", e))
    }
}
