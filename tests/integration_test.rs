//! Integration tests for cache-registry
//!
//! These tests verify end-to-end registry behavior with the memory backend.

#![cfg(feature = "inmemory")]

use cache_registry::observability::{
    CombinedInstrumenter, Finish, Instrumenter, LogInstrumenter, Operation,
};
use cache_registry::options::loader;
use cache_registry::{
    Cache, CacheInstance, CacheOptions, Error, InstanceOptions, ItemOptions,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Test entity definition
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct User {
    id: String,
    name: String,
    email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct Product {
    id: String,
    name: String,
    stock: u32,
}

/// Route library logs to the test output (RUST_LOG=debug to see them)
fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

fn user(id: &str, name: &str) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
    }
}

/// Instrumenter recording `"<op>"` on observe and `"<op> end"` / `"<op> error"`
/// on finish.
fn recording_instrumenter() -> (Arc<dyn Instrumenter>, Arc<Mutex<Vec<String>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let instrumenter = move |op: Operation, _args: &[&str]| -> Finish {
        sink.lock().unwrap().push(op.to_string());
        let sink = Arc::clone(&sink);
        Box::new(move |err: Option<&Error>| {
            let outcome = if err.is_some() { "error" } else { "end" };
            sink.lock().unwrap().push(format!("{} {}", op, outcome));
        })
    };

    (Arc::new(instrumenter), events)
}

/// Test 1: End-to-End Registry Flow
///
/// - Start registry, create typed instance
/// - Set / Get / Delete through the instance
/// - Look the instance up again by name
#[tokio::test]
async fn test_end_to_end_registry_flow() {
    init_logging();
    let cache = Cache::new(CacheOptions::default());
    cache.start().await.expect("Start should succeed");

    let users = cache
        .create::<User>("users", InstanceOptions::default())
        .await
        .expect("Create should succeed");

    let alice = user("u1", "Alice");
    users
        .set("u1", alice.clone())
        .await
        .expect("Set should succeed");

    let looked_up = cache.get::<User>("users").expect("Instance should exist");
    assert_eq!(
        looked_up.get("u1").await.expect("Get should succeed"),
        Some(alice)
    );

    users.delete("u1").await.expect("Delete should succeed");
    assert_eq!(looked_up.get("u1").await.expect("Get should succeed"), None);

    cache.close().await;
}

/// Test 2: Multiple Typed Instances
///
/// Instances are isolated: the same key in two instances holds two values.
#[tokio::test]
async fn test_multiple_instances_are_isolated() {
    let cache = Cache::new(CacheOptions::default());
    cache.start().await.expect("Start should succeed");

    let users = cache
        .create::<User>("users", InstanceOptions::default())
        .await
        .expect("Create users should succeed");
    let products = cache
        .create::<Product>("products", InstanceOptions::default())
        .await
        .expect("Create products should succeed");

    users
        .set("1", user("1", "Bob"))
        .await
        .expect("Set should succeed");
    products
        .set(
            "1",
            Product {
                id: "1".to_string(),
                name: "Laptop".to_string(),
                stock: 3,
            },
        )
        .await
        .expect("Set should succeed");

    assert_eq!(
        users.get("1").await.unwrap().map(|u| u.name),
        Some("Bob".to_string())
    );
    assert_eq!(products.get("1").await.unwrap().map(|p| p.stock), Some(3));

    let mut names = cache.names();
    names.sort();
    assert_eq!(names, vec!["products".to_string(), "users".to_string()]);

    assert!(matches!(
        cache.get::<Product>("users"),
        Err(Error::InvalidCacheType { .. })
    ));
}

/// Test 3: Pop Semantics
///
/// Pop returns the value once; afterwards the key is absent for both Pop
/// and Get.
#[tokio::test]
async fn test_pop_removes_value() {
    let cache = Cache::new(CacheOptions::default());
    let tokens = cache
        .create::<String>("tokens", InstanceOptions::default())
        .await
        .expect("Create should succeed");

    tokens
        .set("t1", "secret".to_string())
        .await
        .expect("Set should succeed");

    assert_eq!(tokens.pop("t1").await.expect("Pop should succeed"), "secret");

    match tokens.pop("t1").await {
        Err(Error::KeyNotFound { key }) => assert_eq!(key, "t1"),
        other => panic!("Expected KeyNotFound, got {:?}", other),
    }
    assert_eq!(tokens.get("t1").await.expect("Get should succeed"), None);
}

/// Test 4: TTL Expiration
///
/// Instance TTL applies by default; item TTL overrides it; a zero item TTL
/// falls back to the instance TTL.
#[tokio::test]
async fn test_ttl_expiration() {
    let cache = Cache::new(CacheOptions::default().with_ttl(Duration::from_millis(100)));
    let sessions = cache
        .create::<String>("sessions", InstanceOptions::default())
        .await
        .expect("Create should succeed");

    sessions
        .set("default", "v".to_string())
        .await
        .expect("Set should succeed");
    sessions
        .set_with(
            "zero",
            "v".to_string(),
            ItemOptions::default().with_ttl(Duration::ZERO),
        )
        .await
        .expect("Set should succeed");
    sessions
        .set_with(
            "long",
            "v".to_string(),
            ItemOptions::default().with_ttl(Duration::from_secs(60)),
        )
        .await
        .expect("Set should succeed");

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(sessions.get("default").await.unwrap(), None);
    assert_eq!(sessions.get("zero").await.unwrap(), None);
    assert_eq!(sessions.get("long").await.unwrap(), Some("v".to_string()));
    assert!(sessions.pop("default").await.unwrap_err().is_not_found());
}

/// Test 5: Cache-Aside Loader
///
/// A miss runs the loader and caches its value; a loader error is returned
/// unmodified and nothing is cached.
#[tokio::test]
async fn test_loader_cache_aside() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let cache = Cache::new(CacheOptions::default());
    let users = cache
        .create::<User>(
            "users",
            InstanceOptions::default().with_loader(loader(move |id: String| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if id == "missing" {
                        return Err(Error::LoaderError(format!("no user {}", id)));
                    }
                    Ok(user(&id, "Loaded"))
                }
            })),
        )
        .await
        .expect("Create should succeed");

    let first = users.get("u7").await.expect("Get should succeed");
    let second = users.get("u7").await.expect("Get should succeed");
    assert_eq!(first, Some(user("u7", "Loaded")));
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        users.get("missing").await,
        Err(Error::LoaderError("no user missing".to_string()))
    );
    assert_eq!(
        users.get("missing").await,
        Err(Error::LoaderError("no user missing".to_string()))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Test 6: Instrumentation Sequence
///
/// Start; Set; Get(hit); Delete; Get(miss, loader); Ping; Close must emit
/// paired observe/finish events in exactly this order.
#[tokio::test]
async fn test_instrumentation_sequence() {
    let (instrumenter, events) = recording_instrumenter();

    let cache = Cache::new(CacheOptions::default().with_instrumenter(instrumenter));
    cache.start().await.expect("Start should succeed");

    let users = cache
        .create::<String>(
            "users",
            InstanceOptions::default()
                .with_loader(loader(|key: String| async move { Ok(format!("loaded-{}", key)) })),
        )
        .await
        .expect("Create should succeed");

    users.set("k", "v".to_string()).await.unwrap();
    assert_eq!(users.get("k").await.unwrap(), Some("v".to_string()));
    users.delete("k").await.unwrap();
    assert_eq!(users.get("k").await.unwrap(), Some("loaded-k".to_string()));
    cache.ping().await.unwrap();
    cache.close().await;

    let events = events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "cache-start",
            "cache-start end",
            "cache-set",
            "cache-set end",
            "cache-get",
            "cache-get end",
            "cache-delete",
            "cache-delete end",
            "cache-get",
            "cache-loader",
            "cache-loader end",
            "cache-get end",
            "cache-ping",
            "cache-ping end",
            "cache-close",
            "cache-close end",
        ]
    );
}

/// Test 7: Errors Reach the Instrumenter
#[tokio::test]
async fn test_instrumentation_sees_errors() {
    let (instrumenter, events) = recording_instrumenter();

    let cache = Cache::new(CacheOptions::default());
    let failing = cache
        .create::<String>(
            "failing",
            InstanceOptions::default()
                .with_instrumenter(instrumenter)
                .with_loader(loader(|_key: String| async move {
                    Err::<String, _>(Error::LoaderError("boom".to_string()))
                })),
        )
        .await
        .expect("Create should succeed");

    assert!(failing.get("k").await.is_err());

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "cache-get",
            "cache-loader",
            "cache-loader error",
            "cache-get error",
        ]
    );
}

/// Test 8: Log Instrumenter Alongside a Recorder
///
/// The combined instrumenter forwards every event to each member.
#[tokio::test]
async fn test_combined_with_log_instrumenter() {
    init_logging();
    let (recorder, events) = recording_instrumenter();
    let combined = CombinedInstrumenter::default()
        .with(Arc::new(LogInstrumenter))
        .with(recorder);

    let cache = Cache::new(CacheOptions::default().with_instrumenter(Arc::new(combined)));
    cache.start().await.expect("Start should succeed");
    let items = cache
        .create::<u32>("items", InstanceOptions::default())
        .await
        .expect("Create should succeed");

    items.set("a", 1).await.unwrap();
    assert!(items.pop("missing").await.unwrap_err().is_not_found());
    cache.close().await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "cache-start",
            "cache-start end",
            "cache-set",
            "cache-set end",
            "cache-get",
            "cache-get end",
            "cache-close",
            "cache-close end",
        ]
    );
}

/// Test 9: Closed Registry
///
/// After Close every handed-out instance fails fast with CacheClosed.
#[tokio::test]
async fn test_operations_after_close() {
    let cache = Cache::new(CacheOptions::default());
    cache.start().await.expect("Start should succeed");
    let users = cache
        .create::<User>("users", InstanceOptions::default())
        .await
        .expect("Create should succeed");

    cache.close().await;

    assert_eq!(users.get("u1").await, Err(Error::CacheClosed));
    assert_eq!(
        users.set("u1", user("u1", "Late")).await,
        Err(Error::CacheClosed)
    );
    assert_eq!(users.pop("u1").await, Err(Error::CacheClosed));
    assert_eq!(users.delete("u1").await, Err(Error::CacheClosed));
    assert!(cache.get::<User>("users").is_err());
    assert!(cache.is_empty());

    // Close stays safe to repeat
    cache.close().await;
}

/// Test 10: Concurrent Access
///
/// Many tasks share one registry and instance without coordination.
#[tokio::test]
async fn test_concurrent_access() {
    let cache = Arc::new(Cache::new(CacheOptions::default()));
    cache
        .create::<u64>("counters", InstanceOptions::default())
        .await
        .expect("Create should succeed");

    let mut handles = vec![];
    for i in 0..16u64 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            let counters = cache.get::<u64>("counters").expect("Instance should exist");
            let key = format!("c{}", i);
            counters.set(&key, i).await.expect("Set should succeed");
            counters.get(&key).await.expect("Get should succeed")
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.expect("Task failed"), Some(i as u64));
    }
}

/// Test 11: Concurrent Creates Under Distinct Names
#[tokio::test]
async fn test_concurrent_create() {
    let cache = Arc::new(Cache::new(CacheOptions::default()));

    let mut handles = vec![];
    for i in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache
                .create::<String>(&format!("cache-{}", i), InstanceOptions::default())
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.expect("Task failed").expect("Create should succeed");
    }

    assert_eq!(cache.len(), 8);
}

/// Test 12: Timeout Cancels a Slow Loader
#[tokio::test]
async fn test_timeout_cancels_slow_loader() {
    let cache = Cache::new(CacheOptions::default());
    let slow = cache
        .create::<String>(
            "slow",
            InstanceOptions::default().with_loader(loader(|key: String| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(key)
            })),
        )
        .await
        .expect("Create should succeed");

    let result = tokio::time::timeout(Duration::from_millis(50), slow.get("k")).await;
    assert!(result.is_err(), "Get should have been cancelled");
    assert_eq!(
        slow.set("k", "fresh".to_string()).await,
        Ok(())
    );
    assert_eq!(slow.get("k").await.unwrap(), Some("fresh".to_string()));
}
