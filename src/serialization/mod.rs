//! Portable value encoding shared by all backends.
//!
//! Values are stored as plain JSON so that any client, in any language,
//! can read what this crate writes (and the other way around). There is no
//! envelope or header: the bytes in the store are exactly `serde_json`'s output.
//!
//! # Example
//!
//! ```rust
//! use cache_registry::serialization::{decode, encode};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! # fn main() -> cache_registry::Result<()> {
//! let user = User { id: 1, name: "Alice".to_string() };
//!
//! let bytes = encode(&user)?;
//! assert_eq!(bytes, br#"{"id":1,"name":"Alice"}"#);
//!
//! let decoded: User = decode(&bytes)?;
//! assert_eq!(user, decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a value for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if the value cannot be represented as
/// JSON (for example a map with non-string keys).
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        log::error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a value read from cache storage.
///
/// # Errors
///
/// Returns `Error::DeserializationError` if the bytes are not valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        log::warn!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })
}
