//! Registry of named, typed cache instances.
//!
//! A [`Cache`] holds the registry-level options, the shared remote
//! connection opened by [`Cache::start`] and every instance created
//! through [`Cache::create`].
//!
//! # Example
//!
//! ```no_run
//! use cache_registry::{Cache, CacheInstance, CacheOptions, InstanceOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> cache_registry::Result<()> {
//!     let cache = Cache::new(CacheOptions::default().with_ttl(Duration::from_secs(60)));
//!     cache.start().await?;
//!
//!     let users = cache
//!         .create::<String>("users", InstanceOptions::default())
//!         .await?;
//!     users.set("42", "alice".to_string()).await?;
//!
//!     // Elsewhere: look the instance up by name and value type
//!     let users = cache.get::<String>("users")?;
//!     assert_eq!(users.get("42").await?, Some("alice".to_string()));
//!
//!     cache.close().await;
//!     Ok(())
//! }
//! ```

use crate::backend::{downcast, ErasedInstance, Instance};
use crate::entity::CacheValue;
use crate::error::{Error, Result};
use crate::observability::Operation;
use crate::options::{CacheOptions, CacheType, InstanceOptions, Loader};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

#[cfg(feature = "inmemory")]
use crate::backend::MemoryInstance;
#[cfg(feature = "redis")]
use crate::backend::{RedisConnection, RedisInstance};
#[cfg(feature = "redis")]
use crate::connection::parse_connection_string;

#[derive(Default)]
struct RegistryState {
    started: bool,
    closed: bool,
    #[cfg(feature = "redis")]
    connection: Option<RedisConnection>,
    /// Connection string the shared connection was opened with.
    #[cfg(feature = "redis")]
    connection_string: String,
}

/// Cache registry.
///
/// Safe to share between tasks (`Arc<Cache>`); every method takes `&self`.
pub struct Cache {
    options: CacheOptions,
    instances: DashMap<String, Arc<dyn ErasedInstance>>,
    state: Mutex<RegistryState>,
}

impl Cache {
    /// Create an empty, unstarted registry.
    pub fn new(options: CacheOptions) -> Self {
        Cache {
            options,
            instances: DashMap::new(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Registry-level options.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Start the registry.
    ///
    /// For a remote cache type this opens the shared connection. Calling it
    /// again after success is a no-op.
    ///
    /// # Errors
    /// Returns `Err` if the connection string is invalid, the connection
    /// cannot be established, or the registry was closed. The registry
    /// stays unstarted on failure.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::CacheClosed);
        }
        if state.started {
            return Ok(());
        }

        let finish = self.options.instrumenter.observe(Operation::Start, &[]);
        let result = self.open_shared(&mut state).await;
        finish(result.as_ref().err());
        result?;

        state.started = true;
        info!("✓ Cache registry started ({})", self.options.cache_type);
        Ok(())
    }

    #[cfg(feature = "redis")]
    async fn open_shared(&self, state: &mut RegistryState) -> Result<()> {
        if !self.options.cache_type.is_remote() {
            return Ok(());
        }

        let params = parse_connection_string(self.options.cache_type, &self.options.connection_string)?
            .with_password_override(&self.options.connection_password);
        let connection = RedisConnection::connect(&params).await?;

        state.connection = Some(connection);
        state.connection_string = self.options.connection_string.clone();
        Ok(())
    }

    #[cfg(not(feature = "redis"))]
    async fn open_shared(&self, _state: &mut RegistryState) -> Result<()> {
        if self.options.cache_type.is_remote() {
            return Err(Error::UnsupportedCacheType(
                self.options.cache_type.to_string(),
            ));
        }
        Ok(())
    }

    /// Close the shared connection and every registered instance.
    ///
    /// Safe to call more than once. Instance close failures are logged and
    /// do not stop the remaining instances from closing. The registry
    /// cannot be started or used to create instances afterwards.
    pub async fn close(&self) {
        let finish = self.options.instrumenter.observe(Operation::Close, &[]);

        let mut state = self.state.lock().await;
        state.closed = true;

        #[cfg(feature = "redis")]
        if let Some(connection) = state.connection.take() {
            connection.close();
        }

        let names: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, instance)) = self.instances.remove(&name) {
                if let Err(e) = instance.close().await {
                    warn!("⚠ Failed to close cache instance {}: {}", name, e);
                }
            }
        }
        drop(state);

        info!("✓ Cache registry closed");
        finish(None);
    }

    /// Ping the shared connection, then every instance that can be pinged.
    ///
    /// # Errors
    /// Returns the first failure; later instances are not pinged.
    pub async fn ping(&self) -> Result<()> {
        let finish = self.options.instrumenter.observe(Operation::Ping, &[]);
        let result = self.ping_all().await;
        finish(result.as_ref().err());
        result
    }

    async fn ping_all(&self) -> Result<()> {
        #[cfg(feature = "redis")]
        {
            let shared = self.state.lock().await.connection.clone();
            if let Some(connection) = shared {
                connection.ping().await?;
            }
        }

        let instances: Vec<Arc<dyn ErasedInstance>> =
            self.instances.iter().map(|e| Arc::clone(e.value())).collect();
        for instance in instances {
            if let Some(result) = instance.ping().await {
                result?;
            }
        }
        Ok(())
    }

    /// Create an instance named `name` and register it.
    ///
    /// `options` override the registry options for this instance only.
    /// An existing instance with the same name is replaced.
    ///
    /// # Errors
    /// Returns `Error::UnsupportedCacheType` if the backend is not compiled
    /// in, `Error::CacheClosed` after [`close`](Self::close), or the error of
    /// opening a private connection. Nothing is registered on error.
    pub async fn create<T: CacheValue>(
        &self,
        name: &str,
        options: InstanceOptions<T>,
    ) -> Result<Instance<T>> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(Error::CacheClosed);
        }

        let merged = self.options.merge(&options);
        let instance = self
            .build_instance(&state, name, &merged, options.loader.clone())
            .await?;

        if self
            .instances
            .insert(name.to_string(), Arc::new(instance.clone()))
            .is_some()
        {
            debug!("✓ Cache instance {} replaced", name);
        }
        debug!(
            "✓ Cache instance {} created ({}, {})",
            name,
            merged.cache_type,
            T::type_name()
        );
        Ok(instance)
    }

    #[cfg_attr(not(feature = "redis"), allow(unused_variables))]
    async fn build_instance<T: CacheValue>(
        &self,
        state: &RegistryState,
        name: &str,
        options: &CacheOptions,
        loader: Option<Loader<T>>,
    ) -> Result<Instance<T>> {
        match options.cache_type {
            #[cfg(feature = "inmemory")]
            CacheType::Memory => Ok(Instance::Memory(MemoryInstance::new(options, loader))),
            #[cfg(feature = "redis")]
            CacheType::Redis | CacheType::RedisCluster | CacheType::RedisSentinel => {
                let shared = state.connection.as_ref().filter(|_| {
                    options.cache_type == self.options.cache_type
                        && options.connection_string == state.connection_string
                });

                let (connection, owns_connection) = match shared {
                    Some(connection) => (connection.clone(), false),
                    None => {
                        let params =
                            parse_connection_string(options.cache_type, &options.connection_string)?
                                .with_password_override(&options.connection_password);
                        (RedisConnection::connect(&params).await?, true)
                    }
                };

                Ok(Instance::Redis(RedisInstance::new(
                    name,
                    connection,
                    owns_connection,
                    options,
                    loader,
                )))
            }
            #[allow(unreachable_patterns)]
            other => Err(Error::UnsupportedCacheType(other.to_string())),
        }
    }

    /// Look up an instance by name and value type.
    ///
    /// # Errors
    /// Returns `Error::CacheNotFound` if no instance has that name and
    /// `Error::InvalidCacheType` if it was created for another value type.
    pub fn get<T: CacheValue>(&self, name: &str) -> Result<Instance<T>> {
        let entry = self
            .instances
            .get(name)
            .ok_or_else(|| Error::CacheNotFound(name.to_string()))?;
        downcast(name, entry.value().as_ref())
    }

    /// Names of the registered instances, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("options", &self.options)
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}
