//! Bound shared by every value type stored in a cache instance.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Trait that all values stored in a cache instance must satisfy.
///
/// Implemented automatically for every `Serialize + DeserializeOwned` type
/// that can cross threads, so user types only need the serde derives.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use cache_registry::CacheValue;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Session {
///     pub user_id: u64,
///     pub roles: Vec<String>,
/// }
///
/// fn assert_cacheable<T: CacheValue>() {}
/// assert_cacheable::<Session>();
/// ```
pub trait CacheValue: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human readable type name, used in registry type mismatch errors.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}
