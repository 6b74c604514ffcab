//! Cache instance implementations.

use crate::entity::CacheValue;
use crate::error::{Error, Result};
use crate::options::ItemOptions;
use futures::future::BoxFuture;
use std::any::Any;

#[cfg(feature = "inmemory")]
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "inmemory")]
pub use memory::MemoryInstance;
#[cfg(feature = "redis")]
pub use redis::{RedisConnection, RedisInstance};

/// Trait for a named, typed cache instance.
///
/// Abstracts the item operations so that callers are independent of the
/// backend behind the instance.
///
/// **IMPORTANT:** All methods use `&self` to allow concurrent access.
/// Implementations use interior mutability or an inherently concurrent client.
///
/// **ASYNC:** All methods are async. Dropping the returned future cancels
/// the operation; wrap calls in `tokio::time::timeout` to bound them.
#[allow(async_fn_in_trait)]
pub trait CacheInstance<T: CacheValue>: Send + Sync + Clone {
    /// Retrieve a value.
    ///
    /// # Returns
    /// - `Ok(Some(value))` - Value found in cache, or produced by the loader
    /// - `Ok(None)` - Cache miss and no loader configured
    ///
    /// # Errors
    /// Returns `Err` on backend, decoding or loader failure, or
    /// `Error::CacheClosed` after `close()`.
    async fn get(&self, key: &str) -> Result<Option<T>>;

    /// Store a value using the instance TTL.
    ///
    /// # Errors
    /// Returns `Err` if the backend rejects the write
    async fn set(&self, key: &str, value: T) -> Result<()> {
        self.set_with(key, value, ItemOptions::default()).await
    }

    /// Store a value with per-item options.
    ///
    /// # Errors
    /// Returns `Err` if the backend rejects the write
    async fn set_with(&self, key: &str, value: T, options: ItemOptions) -> Result<()>;

    /// Atomically read and remove a value.
    ///
    /// # Errors
    /// Returns `Error::KeyNotFound` if the key is absent or expired
    async fn pop(&self, key: &str) -> Result<T>;

    /// Remove a value. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete(&self, key: &str) -> Result<()>;

    /// Release the instance's resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Handle to a cache instance of any backend.
///
/// Cloning is cheap; all clones share the same underlying instance.
pub enum Instance<T: CacheValue> {
    #[cfg(feature = "inmemory")]
    Memory(MemoryInstance<T>),
    #[cfg(feature = "redis")]
    Redis(RedisInstance<T>),
}

impl<T: CacheValue> Clone for Instance<T> {
    fn clone(&self) -> Self {
        match self {
            #[cfg(feature = "inmemory")]
            Instance::Memory(i) => Instance::Memory(i.clone()),
            #[cfg(feature = "redis")]
            Instance::Redis(i) => Instance::Redis(i.clone()),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "inmemory")]
            Instance::Memory($inner) => $body,
            #[cfg(feature = "redis")]
            Instance::Redis($inner) => $body,
        }
    };
}

impl<T: CacheValue> CacheInstance<T> for Instance<T> {
    async fn get(&self, key: &str) -> Result<Option<T>> {
        dispatch!(self, i => i.get(key).await)
    }

    async fn set_with(&self, key: &str, value: T, options: ItemOptions) -> Result<()> {
        dispatch!(self, i => i.set_with(key, value, options).await)
    }

    async fn pop(&self, key: &str) -> Result<T> {
        dispatch!(self, i => i.pop(key).await)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        dispatch!(self, i => i.delete(key).await)
    }

    async fn close(&self) -> Result<()> {
        dispatch!(self, i => i.close().await)
    }
}

impl<T: CacheValue> Instance<T> {
    /// Ping the backing store.
    ///
    /// Returns `None` for backends with nothing meaningful to ping (memory).
    pub async fn ping(&self) -> Option<Result<()>> {
        match self {
            #[cfg(feature = "inmemory")]
            Instance::Memory(_) => None,
            #[cfg(feature = "redis")]
            Instance::Redis(i) => Some(i.ping().await),
        }
    }

    /// Name of the backend, for logs.
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "inmemory")]
            Instance::Memory(_) => "memory",
            #[cfg(feature = "redis")]
            Instance::Redis(_) => "redis",
        }
    }
}

impl<T: CacheValue> std::fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("backend", &self.backend_name())
            .field("value_type", &T::type_name())
            .finish()
    }
}

/// Type-erased view of an [`Instance`] kept by the registry.
///
/// Exposes lifecycle operations without knowing the value type, plus the
/// type tag used to check downcasts.
pub(crate) trait ErasedInstance: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn value_type_name(&self) -> &'static str;
    fn close(&self) -> BoxFuture<'_, Result<()>>;
    fn ping(&self) -> BoxFuture<'_, Option<Result<()>>>;
}

impl<T: CacheValue> ErasedInstance for Instance<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type_name(&self) -> &'static str {
        T::type_name()
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(CacheInstance::close(self))
    }

    fn ping(&self) -> BoxFuture<'_, Option<Result<()>>> {
        Box::pin(Instance::ping(self))
    }
}

/// Downcast a registry entry to a typed instance.
pub(crate) fn downcast<T: CacheValue>(name: &str, erased: &dyn ErasedInstance) -> Result<Instance<T>> {
    erased
        .as_any()
        .downcast_ref::<Instance<T>>()
        .cloned()
        .ok_or_else(|| Error::InvalidCacheType {
            name: name.to_string(),
            expected: T::type_name(),
            found: erased.value_type_name(),
        })
}
