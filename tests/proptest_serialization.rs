//! Property-based tests for cache value serialization.
//!
//! # Properties Tested
//!
//! 1. **Roundtrip Property**: decode(encode(x)) == x for ANY x
//! 2. **Determinism Property**: encode(x) == encode(x) always
//! 3. **Portability Property**: encoded bytes are plain JSON any client can read
//! 4. **Instance Property**: values read back from a memory instance equal
//!    the values written

use cache_registry::serialization::{decode, encode};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Test Values
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
    active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Status {
    Pending,
    Shipped { tracking: String },
    Cancelled(i64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Order {
    id: String,
    owner: Option<User>,
    lines: Vec<(String, u32)>,
    attributes: BTreeMap<String, String>,
    status: Status,
}

fn arb_user() -> impl Strategy<Value = User> {
    (
        any::<u64>(),
        any::<String>(),
        any::<String>(),
        any::<bool>(),
    )
        .prop_map(|(id, name, email, active)| User {
            id,
            name,
            email,
            active,
        })
}

fn arb_status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Pending),
        any::<String>().prop_map(|tracking| Status::Shipped { tracking }),
        any::<i64>().prop_map(Status::Cancelled),
    ]
}

fn arb_order() -> impl Strategy<Value = Order> {
    (
        any::<String>(),
        prop::option::of(arb_user()),
        prop::collection::vec((any::<String>(), any::<u32>()), 0..10),
        prop::collection::btree_map(any::<String>(), any::<String>(), 0..5),
        arb_status(),
    )
        .prop_map(|(id, owner, lines, attributes, status)| Order {
            id,
            owner,
            lines,
            attributes,
            status,
        })
}

// ============================================================================
// Property 1: Roundtrip Property
// ============================================================================

proptest! {
    /// Property: For any User, decode(encode(user)) == user
    #[test]
    fn prop_user_roundtrip(user in arb_user()) {
        let bytes = encode(&user).expect("Encoding should never fail for valid User");
        let decoded: User = decode(&bytes).expect("Decoding should never fail for valid bytes");

        prop_assert_eq!(user, decoded);
    }

    /// Property: Nested values with options, maps and enums survive
    #[test]
    fn prop_order_roundtrip(order in arb_order()) {
        let bytes = encode(&order).expect("Encoding should never fail for valid Order");
        let decoded: Order = decode(&bytes).expect("Decoding should never fail for valid bytes");

        prop_assert_eq!(order, decoded);
    }

    /// Property: Plain strings (including control characters and unicode)
    #[test]
    fn prop_string_roundtrip(s in any::<String>()) {
        let bytes = encode(&s).expect("Encoding should succeed");
        let decoded: String = decode(&bytes).expect("Decoding should succeed");

        prop_assert_eq!(s, decoded);
    }
}

// ============================================================================
// Property 2: Determinism Property
// ============================================================================

proptest! {
    /// Property: Encoding the same value twice produces identical bytes
    #[test]
    fn prop_order_determinism(order in arb_order()) {
        let bytes1 = encode(&order).expect("Encoding should succeed");
        let bytes2 = encode(&order).expect("Encoding should succeed");

        prop_assert_eq!(bytes1, bytes2, "Encoding must be deterministic");
    }
}

// ============================================================================
// Property 3: Portability Property
// ============================================================================

proptest! {
    /// Property: Encoded bytes parse as generic JSON with the same fields
    #[test]
    fn prop_user_is_plain_json(user in arb_user()) {
        let bytes = encode(&user).expect("Encoding should succeed");
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).expect("Encoded bytes must be valid JSON");

        prop_assert_eq!(value["id"].as_u64(), Some(user.id));
        prop_assert_eq!(value["name"].as_str(), Some(user.name.as_str()));
        prop_assert_eq!(value["active"].as_bool(), Some(user.active));
    }

    /// Property: Decoding never panics on arbitrary bytes
    #[test]
    fn prop_decode_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode::<Order>(&bytes);
    }
}

// ============================================================================
// Property 4: Instance Property
// ============================================================================

#[cfg(feature = "inmemory")]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: What goes into a memory instance comes back out unchanged
    #[test]
    fn prop_memory_instance_roundtrip(key in "[a-z0-9:]{1,24}", order in arb_order()) {
        use cache_registry::backend::{CacheInstance, MemoryInstance};
        use cache_registry::CacheOptions;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to build runtime");

        let read_back = runtime.block_on(async {
            let cache = MemoryInstance::<Order>::new(&CacheOptions::default(), None);
            cache.set(&key, order.clone()).await.expect("Set should succeed");
            cache.get(&key).await.expect("Get should succeed")
        });

        prop_assert_eq!(read_back, Some(order));
    }
}
