//! # cache-registry
//!
//! A registry of named, typed caches that can be backed interchangeably by an
//! in-process eviction cache or by Redis (standalone, cluster or sentinel).
//!
//! ## Features
//!
//! - **Typed instances:** every instance stores one value type `T`, looked up by name
//! - **Backend agnostic:** memory and Redis behind one [`CacheInstance`] contract
//! - **Cache-aside loading:** an optional loader fills misses
//! - **TTLs:** per-instance defaults with per-item overrides
//! - **Atomic pop:** read-and-remove in one step
//! - **Instrumentation:** every operation is bracketed by an [`Instrumenter`](observability::Instrumenter)
//!
//! ## Quick Start
//!
//! ```no_run
//! use cache_registry::{Cache, CacheInstance, CacheOptions, InstanceOptions, ItemOptions};
//! use cache_registry::options::loader;
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct User {
//!     id: String,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> cache_registry::Result<()> {
//!     // 1. Configure and start the registry
//!     let cache = Cache::new(
//!         CacheOptions::default()
//!             .with_ttl(Duration::from_secs(300))
//!             .with_key_prefix("app"),
//!     );
//!     cache.start().await?;
//!
//!     // 2. Create a typed instance, optionally with a loader
//!     let users = cache
//!         .create::<User>(
//!             "users",
//!             InstanceOptions::default().with_loader(loader(|id: String| async move {
//!                 Ok(User { name: format!("user {}", id), id })
//!             })),
//!         )
//!         .await?;
//!
//!     // 3. Use it
//!     let user = users.get("42").await?; // miss -> loader -> cached
//!     users
//!         .set_with(
//!             "43",
//!             User { id: "43".into(), name: "bob".into() },
//!             ItemOptions::default().with_ttl(Duration::from_secs(10)),
//!         )
//!         .await?;
//!     let bob = users.pop("43").await?;
//!     # let _ = (user, bob);
//!
//!     // 4. Tear down
//!     cache.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! | Cache type | Feature | Connection string |
//! |------------|---------|-------------------|
//! | `memory` | `inmemory` (default) | none |
//! | `redis` | `redis` | `redis://[user:pass@]host[:port][/db]` |
//! | `redis-cluster` | `redis` | `redis://host:port?addr=host:port` |
//! | `redis-sentinel` | `redis` | `sentinel://[user@]host1,host2/master[?db=n]` |

#[macro_use]
extern crate log;

#[cfg(not(any(feature = "inmemory", feature = "redis")))]
compile_error!("enable at least one backend feature: `inmemory` or `redis`");

pub mod backend;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod key;
pub mod observability;
pub mod options;
pub mod registry;
pub mod serialization;

// Re-exports for convenience
pub use backend::{CacheInstance, Instance};
pub use config::CacheConfig;
pub use connection::validate_connection_string;
pub use entity::CacheValue;
pub use error::{Error, Result};
pub use options::{CacheOptions, CacheType, InstanceOptions, ItemOptions};
pub use registry::Cache;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
