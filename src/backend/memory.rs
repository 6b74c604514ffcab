//! In-memory cache instance (thread-safe, async).
//!
//! Backed by a `moka` cache bounded by a cost budget: every entry weighs
//! its encoded size in bytes. Expiration is tracked per entry, so an item
//! TTL can differ from the instance TTL.

use super::CacheInstance;
use crate::entity::CacheValue;
use crate::error::{Error, Result};
use crate::observability::{Instrumenter, Operation};
use crate::options::{CacheOptions, ItemOptions, Loader};
use crate::serialization::{decode, encode};
use moka::sync::Cache;
use moka::Expiry;
use parking_lot::{Mutex, RwLock};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stored entry: encoded value plus its own time-to-live.
#[derive(Clone)]
struct CacheEntry {
    data: Arc<[u8]>,
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        CacheEntry {
            data: data.into(),
            ttl: (!ttl.is_zero()).then_some(ttl),
        }
    }
}

/// Expiry policy reading the TTL stored on each entry.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

struct Inner<T> {
    store: RwLock<Option<Cache<String, CacheEntry>>>,
    ttl: Duration,
    loader: Option<Loader<T>>,
    instrumenter: Arc<dyn Instrumenter>,
    pop_lock: Mutex<()>,
}

/// In-memory cache instance.
///
/// Each instance exclusively owns its eviction structure. Values are
/// stored encoded, so every hit returns an independent `T`.
///
/// # Example
///
/// ```no_run
/// use cache_registry::backend::{CacheInstance, MemoryInstance};
/// use cache_registry::options::{CacheOptions, ItemOptions};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let sessions = MemoryInstance::<String>::new(&CacheOptions::default(), None);
///
///     sessions.set("s1", "alice".to_string()).await?;
///     assert_eq!(sessions.get("s1").await?, Some("alice".to_string()));
///
///     // Store with an item TTL
///     let short = ItemOptions::default().with_ttl(Duration::from_secs(30));
///     sessions.set_with("s2", "bob".to_string(), short).await?;
///
///     Ok(())
/// }
/// ```
pub struct MemoryInstance<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for MemoryInstance<T> {
    fn clone(&self) -> Self {
        MemoryInstance {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<T: CacheValue> MemoryInstance<T> {
    /// Create a new memory instance sized by the options' memory limits.
    pub fn new(options: &CacheOptions, loader: Option<Loader<T>>) -> Self {
        let store = Cache::builder()
            .max_capacity(options.memory_max_cost)
            .initial_capacity(options.memory_initial_capacity)
            .weigher(|key: &String, entry: &CacheEntry| -> u32 {
                u32::try_from(key.len() + entry.data.len()).unwrap_or(u32::MAX)
            })
            .expire_after(EntryExpiry)
            .build();

        MemoryInstance {
            inner: Arc::new(Inner {
                store: RwLock::new(Some(store)),
                ttl: options.ttl,
                loader,
                instrumenter: Arc::clone(&options.instrumenter),
                pop_lock: Mutex::new(()),
            }),
            _marker: PhantomData,
        }
    }

    /// Handle to the live store, or `CacheClosed`.
    fn store(&self) -> Result<Cache<String, CacheEntry>> {
        self.inner.store.read().clone().ok_or(Error::CacheClosed)
    }

    /// Get the current number of entries in cache.
    pub fn len(&self) -> u64 {
        match self.store() {
            Ok(store) => {
                store.run_pending_tasks();
                store.entry_count()
            }
            Err(_) => 0,
        }
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let store = self.store()?;
        let entry = CacheEntry::new(encode(value)?, ttl);
        store.insert(key.to_string(), entry);

        if ttl.is_zero() {
            debug!("✓ Memory SET {}", key);
        } else {
            debug!("✓ Memory SET {} (TTL: {:?})", key, ttl);
        }
        Ok(())
    }

    async fn get_inner(&self, key: &str) -> Result<Option<T>> {
        let store = self.store()?;

        if let Some(entry) = store.get(key) {
            debug!("✓ Memory GET {} -> HIT", key);
            return decode(&entry.data).map(Some);
        }

        debug!("✓ Memory GET {} -> MISS", key);
        let Some(loader) = &self.inner.loader else {
            return Ok(None);
        };

        let finish = self.inner.instrumenter.observe(Operation::Loader, &[key]);
        let loaded = loader(key.to_string()).await;
        finish(loaded.as_ref().err());
        let value = loaded?;

        self.write(key, &value, self.inner.ttl)?;
        Ok(Some(value))
    }

    fn pop_inner(&self, key: &str) -> Result<T> {
        let store = self.store()?;
        let _guard = self.inner.pop_lock.lock();

        let entry = store.get(key).ok_or_else(|| Error::KeyNotFound {
            key: key.to_string(),
        })?;
        store.invalidate(key);

        debug!("✓ Memory POP {}", key);
        decode(&entry.data)
    }
}

impl<T: CacheValue> CacheInstance<T> for MemoryInstance<T> {
    async fn get(&self, key: &str) -> Result<Option<T>> {
        let finish = self.inner.instrumenter.observe(Operation::Get, &[key]);
        let result = self.get_inner(key).await;
        finish(result.as_ref().err());
        result
    }

    async fn set_with(&self, key: &str, value: T, options: ItemOptions) -> Result<()> {
        let finish = self.inner.instrumenter.observe(Operation::Set, &[key]);
        let result = self.write(key, &value, options.resolve_ttl(self.inner.ttl));
        finish(result.as_ref().err());
        result
    }

    async fn pop(&self, key: &str) -> Result<T> {
        let finish = self.inner.instrumenter.observe(Operation::Get, &[key]);
        let result = self.pop_inner(key);
        // A missing key is a completed lookup for the hook.
        finish(result.as_ref().err().filter(|e| !e.is_not_found()));
        result
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let finish = self.inner.instrumenter.observe(Operation::Delete, &[key]);
        let result = self.store().map(|store| {
            store.invalidate(key);
            debug!("✓ Memory DELETE {}", key);
        });
        finish(result.as_ref().err());
        result
    }

    async fn close(&self) -> Result<()> {
        if let Some(store) = self.inner.store.write().take() {
            store.invalidate_all();
            debug!("✓ Memory CLOSE ({} entries dropped)", store.entry_count());
        }
        Ok(())
    }
}
