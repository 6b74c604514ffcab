//! Cache key namespacing.
//!
//! Remote instances share one keyspace, so every key is prefixed with the
//! registry prefix (if any) and the instance name:
//!
//! ```text
//! <registry prefix>:<instance name>:<key>
//! ```

/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

/// Builder for namespaced cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build the prefix for an instance, including the trailing separator.
    ///
    /// An empty registry prefix is omitted.
    pub fn instance_prefix(registry_prefix: &str, name: &str) -> String {
        if registry_prefix.is_empty() {
            format!("{}{}", name, KEY_SEPARATOR)
        } else {
            format!(
                "{}{}{}{}",
                registry_prefix, KEY_SEPARATOR, name, KEY_SEPARATOR
            )
        }
    }

    /// Build full cache key from an instance prefix and a caller key.
    pub fn build(instance_prefix: &str, key: &str) -> String {
        let mut full = String::with_capacity(instance_prefix.len() + key.len());
        full.push_str(instance_prefix);
        full.push_str(key);
        full
    }
}
