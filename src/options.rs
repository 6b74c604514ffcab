//! Cache-level and item-level options.
//!
//! Options come in three layers, applied in order:
//!
//! 1. [`CacheOptions`]: registry-wide settings given to [`Cache::new`](crate::Cache::new).
//! 2. [`InstanceOptions`]: per-instance overrides given to
//!    [`Cache::create`](crate::Cache::create), including the typed loader.
//! 3. [`ItemOptions`]: per-call overrides given to `set_with`.
//!
//! # Example
//!
//! ```
//! use cache_registry::options::{CacheOptions, CacheType, InstanceOptions, ItemOptions};
//! use std::time::Duration;
//!
//! let options = CacheOptions::new(CacheType::Memory)
//!     .with_ttl(Duration::from_secs(3600))
//!     .with_key_prefix("app");
//!
//! // This instance keeps entries for five minutes unless told otherwise.
//! let overrides = InstanceOptions::<String>::default()
//!     .with_ttl(Duration::from_secs(300));
//!
//! // A single write that expires after one second.
//! let item = ItemOptions::default().with_ttl(Duration::from_secs(1));
//! # let _ = (options, overrides, item);
//! ```

use crate::error::{Error, Result};
use crate::observability::{Instrumenter, NoopInstrumenter};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default cost budget for memory instances (1 GiB of encoded value bytes).
pub const DEFAULT_MEMORY_MAX_COST: u64 = 1 << 30;

/// Default number of keys memory instances pre-allocate room for.
pub const DEFAULT_MEMORY_INITIAL_CAPACITY: usize = 1000;

/// Function invoked on a cache miss to produce the value.
///
/// **Not single-flighted:** concurrent misses on the same key may each run
/// the loader and each write the result; the last write wins.
pub type Loader<T> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Wrap an async function into a [`Loader`].
///
/// ```
/// use cache_registry::options::{loader, Loader};
///
/// let load: Loader<String> = loader(|key: String| async move { Ok(format!("value-{}", key)) });
/// # let _ = load;
/// ```
pub fn loader<T, F, Fut>(f: F) -> Loader<T>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move |key| -> BoxFuture<'static, Result<T>> { Box::pin(f(key)) })
}

/// Backend kind behind a cache instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheType {
    /// In-process eviction cache.
    #[default]
    Memory,
    /// Standalone Redis server.
    Redis,
    /// Redis cluster.
    RedisCluster,
    /// Redis master discovered through sentinels.
    RedisSentinel,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Memory => "memory",
            CacheType::Redis => "redis",
            CacheType::RedisCluster => "redis-cluster",
            CacheType::RedisSentinel => "redis-sentinel",
        }
    }

    /// Whether the backend lives outside the process and needs a connection.
    pub fn is_remote(&self) -> bool {
        !matches!(self, CacheType::Memory)
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "memory" => Ok(CacheType::Memory),
            "redis" => Ok(CacheType::Redis),
            "redis-cluster" => Ok(CacheType::RedisCluster),
            "redis-sentinel" => Ok(CacheType::RedisSentinel),
            other => Err(Error::UnsupportedCacheType(other.to_string())),
        }
    }
}

/// Registry-wide cache options.
///
/// A zero TTL means "no expiration" for memory instances and
/// "backend default" (a persistent key) for remote instances.
#[derive(Clone)]
pub struct CacheOptions {
    pub cache_type: CacheType,
    pub ttl: Duration,
    pub connection_string: String,
    /// Overrides the password embedded in the connection string when non-empty.
    pub connection_password: String,
    pub key_prefix: String,
    pub instrumenter: Arc<dyn Instrumenter>,
    /// Cost budget of a memory instance, in encoded value bytes.
    pub memory_max_cost: u64,
    pub memory_initial_capacity: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            cache_type: CacheType::Memory,
            ttl: Duration::ZERO,
            connection_string: String::new(),
            connection_password: String::new(),
            key_prefix: String::new(),
            instrumenter: Arc::new(NoopInstrumenter),
            memory_max_cost: DEFAULT_MEMORY_MAX_COST,
            memory_initial_capacity: DEFAULT_MEMORY_INITIAL_CAPACITY,
        }
    }
}

impl CacheOptions {
    pub fn new(cache_type: CacheType) -> Self {
        CacheOptions {
            cache_type,
            ..Default::default()
        }
    }

    /// Set the default TTL for items.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    pub fn with_connection_password(mut self, password: impl Into<String>) -> Self {
        self.connection_password = password.into();
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_instrumenter(mut self, instrumenter: Arc<dyn Instrumenter>) -> Self {
        self.instrumenter = instrumenter;
        self
    }

    /// Set the sizing of memory instances.
    pub fn with_memory_limits(mut self, max_cost: u64, initial_capacity: usize) -> Self {
        self.memory_max_cost = max_cost;
        self.memory_initial_capacity = initial_capacity;
        self
    }

    /// Apply instance overrides on top of these options.
    pub fn merge<T>(&self, overrides: &InstanceOptions<T>) -> CacheOptions {
        let mut merged = self.clone();
        if let Some(cache_type) = overrides.cache_type {
            merged.cache_type = cache_type;
        }
        if let Some(ttl) = overrides.ttl {
            merged.ttl = ttl;
        }
        if let Some(connection_string) = &overrides.connection_string {
            merged.connection_string = connection_string.clone();
        }
        if let Some(password) = &overrides.connection_password {
            merged.connection_password = password.clone();
        }
        if let Some(key_prefix) = &overrides.key_prefix {
            merged.key_prefix = key_prefix.clone();
        }
        if let Some(instrumenter) = &overrides.instrumenter {
            merged.instrumenter = Arc::clone(instrumenter);
        }
        if let Some((max_cost, initial_capacity)) = overrides.memory_limits {
            merged.memory_max_cost = max_cost;
            merged.memory_initial_capacity = initial_capacity;
        }
        merged
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("cache_type", &self.cache_type)
            .field("ttl", &self.ttl)
            .field("connection_string", &self.connection_string)
            .field(
                "connection_password",
                &if self.connection_password.is_empty() {
                    ""
                } else {
                    "***"
                },
            )
            .field("key_prefix", &self.key_prefix)
            .field("memory_max_cost", &self.memory_max_cost)
            .field("memory_initial_capacity", &self.memory_initial_capacity)
            .finish_non_exhaustive()
    }
}

/// Per-instance overrides applied by [`Cache::create`](crate::Cache::create).
///
/// Every field left unset inherits the registry's [`CacheOptions`].
pub struct InstanceOptions<T> {
    pub cache_type: Option<CacheType>,
    pub ttl: Option<Duration>,
    pub connection_string: Option<String>,
    pub connection_password: Option<String>,
    pub key_prefix: Option<String>,
    pub instrumenter: Option<Arc<dyn Instrumenter>>,
    pub memory_limits: Option<(u64, usize)>,
    pub loader: Option<Loader<T>>,
}

impl<T> Default for InstanceOptions<T> {
    fn default() -> Self {
        InstanceOptions {
            cache_type: None,
            ttl: None,
            connection_string: None,
            connection_password: None,
            key_prefix: None,
            instrumenter: None,
            memory_limits: None,
            loader: None,
        }
    }
}

impl<T> Clone for InstanceOptions<T> {
    fn clone(&self) -> Self {
        InstanceOptions {
            cache_type: self.cache_type,
            ttl: self.ttl,
            connection_string: self.connection_string.clone(),
            connection_password: self.connection_password.clone(),
            key_prefix: self.key_prefix.clone(),
            instrumenter: self.instrumenter.clone(),
            memory_limits: self.memory_limits,
            loader: self.loader.clone(),
        }
    }
}

impl<T> InstanceOptions<T> {
    pub fn with_cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = Some(cache_type);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    pub fn with_connection_password(mut self, password: impl Into<String>) -> Self {
        self.connection_password = Some(password.into());
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(key_prefix.into());
        self
    }

    pub fn with_instrumenter(mut self, instrumenter: Arc<dyn Instrumenter>) -> Self {
        self.instrumenter = Some(instrumenter);
        self
    }

    pub fn with_memory_limits(mut self, max_cost: u64, initial_capacity: usize) -> Self {
        self.memory_limits = Some((max_cost, initial_capacity));
        self
    }

    /// Set the function that loads values on cache miss.
    pub fn with_loader(mut self, loader: Loader<T>) -> Self {
        self.loader = Some(loader);
        self
    }
}

impl<T> fmt::Debug for InstanceOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceOptions")
            .field("cache_type", &self.cache_type)
            .field("ttl", &self.ttl)
            .field("connection_string", &self.connection_string)
            .field("key_prefix", &self.key_prefix)
            .field("has_loader", &self.loader.is_some())
            .finish_non_exhaustive()
    }
}

/// Per-item options for a single write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemOptions {
    /// Override the instance TTL for this item only.
    ///
    /// A zero duration is treated as unset.
    pub ttl: Option<Duration>,
}

impl ItemOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Effective TTL: the item override when set and non-zero, else `default`.
    pub fn resolve_ttl(&self, default: Duration) -> Duration {
        match self.ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => default,
        }
    }
}
