//! Redis cache instance (standalone, cluster and sentinel).
//!
//! Values are written as JSON so any client can read them back. Keys are
//! namespaced as `<key prefix>:<instance name>:<key>`.

use super::CacheInstance;
use crate::connection::{
    ClusterParams, ConnectionParams, Credentials, NodeAddr, Protocol, SentinelParams,
};
use crate::entity::CacheValue;
use crate::error::{Error, Result};
use crate::key::CacheKeyBuilder;
use crate::observability::{Instrumenter, Operation};
use crate::options::{CacheOptions, ItemOptions, Loader};
use crate::serialization::{decode, encode};
use deadpool_redis::{Manager, Pool, Runtime};
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::{
    Cmd, ConnectionAddr, ConnectionInfo, ErrorKind, FromRedisValue, ProtocolVersion,
    RedisConnectionInfo, RedisError, TlsMode,
};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Default Redis connection pool size for standalone servers.
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: usize = 16;

fn pool_size() -> usize {
    std::env::var("REDIS_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_POOL_SIZE)
}

fn protocol_version(protocol: Protocol) -> ProtocolVersion {
    match protocol {
        Protocol::Resp2 => ProtocolVersion::RESP2,
        Protocol::Resp3 => ProtocolVersion::RESP3,
    }
}

/// Build the client connection info of one node.
fn node_info(
    addr: &NodeAddr,
    db: i64,
    credentials: &Credentials,
    protocol: Protocol,
) -> Result<ConnectionInfo> {
    let addr = match addr {
        NodeAddr::Tcp {
            host,
            port,
            tls: false,
            ..
        } => ConnectionAddr::Tcp(host.clone(), *port),
        NodeAddr::Tcp {
            host,
            port,
            tls: true,
            insecure,
        } => ConnectionAddr::TcpTls {
            host: host.clone(),
            port: *port,
            insecure: *insecure,
            tls_params: None,
        },
        #[cfg(unix)]
        NodeAddr::Unix(path) => ConnectionAddr::Unix(path.clone()),
        #[cfg(not(unix))]
        NodeAddr::Unix(path) => {
            return Err(Error::InvalidConnectionString(format!(
                "unix sockets are not supported on this platform: {}",
                path.display()
            )))
        }
    };

    Ok(ConnectionInfo {
        addr,
        redis: redis_info(db, credentials, protocol),
    })
}

fn redis_info(db: i64, credentials: &Credentials, protocol: Protocol) -> RedisConnectionInfo {
    RedisConnectionInfo {
        db,
        username: credentials.username.clone(),
        password: credentials.password.clone(),
        protocol: protocol_version(protocol),
    }
}

fn is_insecure(addr: &NodeAddr) -> bool {
    matches!(addr, NodeAddr::Tcp { insecure: true, .. })
}

fn is_tls(addr: &NodeAddr) -> bool {
    matches!(addr, NodeAddr::Tcp { tls: true, .. })
}

/// Live connection to a Redis deployment.
///
/// Cloning is cheap and every clone talks to the same deployment.
#[derive(Clone)]
pub enum RedisConnection {
    /// Pooled connections to a single server.
    Standalone(Pool),
    /// Cluster-aware connection routing keys to their slot owner.
    Cluster(ClusterConnection),
    /// Connection to the master discovered through sentinels.
    Sentinel(Arc<SentinelConnection>),
}

impl RedisConnection {
    /// Connect to the deployment described by `params`.
    ///
    /// Standalone pools connect lazily on first use; cluster and sentinel
    /// connections are established before returning.
    ///
    /// # Errors
    /// Returns `Err` if the client cannot be built or the initial
    /// cluster/sentinel handshake fails.
    pub async fn connect(params: &ConnectionParams) -> Result<Self> {
        match params {
            ConnectionParams::Standalone(p) => {
                let info = node_info(&p.addr, p.db, &p.credentials, p.options.protocol)?;
                let manager = Manager::new(info)?;
                let size = p.options.pool_size.unwrap_or_else(pool_size);
                let pool = Pool::builder(manager)
                    .max_size(size)
                    .runtime(Runtime::Tokio1)
                    .build()
                    .map_err(|e| Error::BackendError(format!("Failed to create Redis pool: {}", e)))?;

                info!("✓ Redis standalone connection initialized (pool size: {})", size);
                Ok(RedisConnection::Standalone(pool))
            }
            ConnectionParams::Cluster(p) => Self::connect_cluster(p).await,
            ConnectionParams::Sentinel(p) => Self::connect_sentinel(p).await,
        }
    }

    async fn connect_cluster(params: &ClusterParams) -> Result<Self> {
        let nodes = params
            .nodes
            .iter()
            .map(|n| node_info(n, 0, &params.credentials, params.options.protocol))
            .collect::<Result<Vec<_>>>()?;

        let mut builder = ClusterClientBuilder::new(nodes)
            .use_protocol(protocol_version(params.options.protocol));
        if let Some(username) = &params.credentials.username {
            builder = builder.username(username.clone());
        }
        if let Some(password) = &params.credentials.password {
            builder = builder.password(password.clone());
        }
        if params.nodes.iter().any(is_insecure) {
            builder = builder.tls(TlsMode::Insecure);
        }

        let client = builder.build()?;
        let conn = client.get_async_connection().await?;

        info!(
            "✓ Redis cluster connection initialized ({} seed nodes)",
            params.nodes.len()
        );
        Ok(RedisConnection::Cluster(conn))
    }

    async fn connect_sentinel(params: &SentinelParams) -> Result<Self> {
        let sentinels = params
            .addrs
            .iter()
            .map(|a| node_info(a, 0, &Credentials::default(), Protocol::Resp2))
            .collect::<Result<Vec<_>>>()?;

        let tls_mode = if params.insecure {
            Some(TlsMode::Insecure)
        } else if params.addrs.iter().any(is_tls) {
            Some(TlsMode::Secure)
        } else {
            None
        };
        let master_info = SentinelNodeConnectionInfo {
            tls_mode,
            redis_connection_info: Some(redis_info(params.db, &params.credentials, Protocol::Resp2)),
        };

        let mut client = SentinelClient::build(
            sentinels,
            params.master_name.clone(),
            Some(master_info),
            SentinelServerType::Master,
        )?;
        let conn = client.get_async_connection().await?;

        info!(
            "✓ Redis sentinel connection initialized (master: {})",
            params.master_name
        );
        Ok(RedisConnection::Sentinel(Arc::new(SentinelConnection {
            master_name: params.master_name.clone(),
            client: tokio::sync::Mutex::new(client),
            current: RwLock::new((0, conn)),
        })))
    }

    /// Run a single command.
    pub async fn query<V: FromRedisValue>(&self, cmd: &Cmd) -> Result<V> {
        match self {
            RedisConnection::Standalone(pool) => {
                let mut conn = pool.get().await?;
                Ok(cmd.query_async(&mut *conn).await?)
            }
            RedisConnection::Cluster(conn) => {
                let mut conn = conn.clone();
                Ok(cmd.query_async(&mut conn).await?)
            }
            RedisConnection::Sentinel(sentinel) => sentinel.query(cmd).await,
        }
    }

    /// Check the deployment answers.
    pub async fn ping(&self) -> Result<()> {
        let pong: String = self.query(&redis::cmd("PING")).await?;

        if pong.contains("PONG") {
            Ok(())
        } else {
            Err(Error::BackendError(format!(
                "Redis PING returned unexpected reply: {}",
                pong
            )))
        }
    }

    /// Release the connection. Pools stop handing out connections;
    /// multiplexed connections close once the last clone is dropped.
    pub fn close(&self) {
        if let RedisConnection::Standalone(pool) = self {
            pool.close();
        }
        debug!("✓ Redis {} connection closed", self.topology());
    }

    pub fn topology(&self) -> &'static str {
        match self {
            RedisConnection::Standalone(_) => "standalone",
            RedisConnection::Cluster(_) => "cluster",
            RedisConnection::Sentinel(_) => "sentinel",
        }
    }
}

/// What a sentinel-managed connection does after a failed command.
#[derive(Debug, PartialEq, Eq)]
enum Recovery {
    /// Keep the connection; the error is the command's own.
    None,
    /// The connection is broken. Rediscover the master for later commands.
    Reconnect,
    /// The node refused the command without running it, typically a
    /// demoted master. Rediscover the master and run the command again.
    ReconnectAndRetry,
}

fn recovery_for(err: &RedisError) -> Recovery {
    match err.kind() {
        ErrorKind::ReadOnly | ErrorKind::MasterDown => Recovery::ReconnectAndRetry,
        _ if err.is_io_error() || err.is_unrecoverable_error() => Recovery::Reconnect,
        _ => Recovery::None,
    }
}

/// Master connection that follows sentinel failovers.
pub struct SentinelConnection {
    master_name: String,
    client: tokio::sync::Mutex<SentinelClient>,
    /// Current master connection and its generation.
    current: RwLock<(u64, MultiplexedConnection)>,
}

impl SentinelConnection {
    async fn query<V: FromRedisValue>(&self, cmd: &Cmd) -> Result<V> {
        let (generation, mut conn) = self.current.read().clone();

        let err = match cmd.query_async(&mut conn).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        match recovery_for(&err) {
            Recovery::None => Err(err.into()),
            Recovery::Reconnect => {
                if let Err(e) = self.reconnect(generation).await {
                    warn!("Redis sentinel reconnect failed: {}", e);
                }
                Err(err.into())
            }
            Recovery::ReconnectAndRetry => {
                let mut conn = self.reconnect(generation).await?;
                Ok(cmd.query_async(&mut conn).await?)
            }
        }
    }

    /// Ask the sentinels for the master again, unless another caller already
    /// replaced the connection seen at `generation`.
    async fn reconnect(&self, generation: u64) -> Result<MultiplexedConnection> {
        let mut client = self.client.lock().await;

        {
            let current = self.current.read();
            if current.0 != generation {
                return Ok(current.1.clone());
            }
        }

        warn!(
            "Redis sentinel connection to master {} lost, rediscovering",
            self.master_name
        );
        let conn = client.get_async_connection().await?;
        *self.current.write() = (generation.wrapping_add(1), conn.clone());
        info!("✓ Redis sentinel reconnected to master {}", self.master_name);
        Ok(conn)
    }
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RedisConnection")
            .field(&self.topology())
            .finish()
    }
}

struct Inner<T> {
    connection: RwLock<Option<RedisConnection>>,
    /// Private connections are closed with the instance; shared ones
    /// belong to the registry.
    owns_connection: bool,
    prefix: String,
    ttl: Duration,
    loader: Option<Loader<T>>,
    instrumenter: Arc<dyn Instrumenter>,
}

/// Redis-backed cache instance.
pub struct RedisInstance<T> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RedisInstance<T> {
    fn clone(&self) -> Self {
        RedisInstance {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<T: CacheValue> RedisInstance<T> {
    /// Create an instance named `name` on top of `connection`.
    ///
    /// With `owns_connection` the connection is closed when the instance is.
    pub fn new(
        name: &str,
        connection: RedisConnection,
        owns_connection: bool,
        options: &CacheOptions,
        loader: Option<Loader<T>>,
    ) -> Self {
        RedisInstance {
            inner: Arc::new(Inner {
                connection: RwLock::new(Some(connection)),
                owns_connection,
                prefix: CacheKeyBuilder::instance_prefix(&options.key_prefix, name),
                ttl: options.ttl,
                loader,
                instrumenter: Arc::clone(&options.instrumenter),
            }),
            _marker: PhantomData,
        }
    }

    /// Full store key of `key`.
    pub fn key(&self, key: &str) -> String {
        CacheKeyBuilder::build(&self.inner.prefix, key)
    }

    fn connection(&self) -> Result<RedisConnection> {
        self.inner
            .connection
            .read()
            .clone()
            .ok_or(Error::CacheClosed)
    }

    /// Ping the backing deployment. A closed instance has nothing to ping.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.inner.connection.read().clone();
        match conn {
            Some(conn) => conn.ping().await,
            None => Ok(()),
        }
    }

    async fn write(&self, conn: &RedisConnection, full_key: &str, value: &T, ttl: Duration) -> Result<()> {
        let data = encode(value)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(full_key).arg(data);
        if !ttl.is_zero() {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }

        conn.query::<()>(&cmd).await?;

        if ttl.is_zero() {
            debug!("✓ Redis SET {}", full_key);
        } else {
            debug!("✓ Redis SET {} (TTL: {:?})", full_key, ttl);
        }
        Ok(())
    }

    async fn get_inner(&self, conn: &RedisConnection, key: &str, full_key: &str) -> Result<Option<T>> {
        let raw: Option<Vec<u8>> = conn.query(redis::cmd("GET").arg(full_key)).await?;

        if let Some(bytes) = raw {
            debug!("✓ Redis GET {} -> HIT", full_key);
            return decode(&bytes).map(Some);
        }

        debug!("✓ Redis GET {} -> MISS", full_key);
        let Some(loader) = &self.inner.loader else {
            return Ok(None);
        };

        let finish = self.inner.instrumenter.observe(Operation::Loader, &[key]);
        let loaded = loader(key.to_string()).await;
        finish(loaded.as_ref().err());
        let value = loaded?;

        self.write(conn, full_key, &value, self.inner.ttl).await?;
        Ok(Some(value))
    }
}

impl<T: CacheValue> CacheInstance<T> for RedisInstance<T> {
    async fn get(&self, key: &str) -> Result<Option<T>> {
        let conn = self.connection()?;
        let full_key = self.key(key);

        let finish = self.inner.instrumenter.observe(Operation::Get, &[&full_key]);
        let result = self.get_inner(&conn, key, &full_key).await;
        finish(result.as_ref().err());
        result
    }

    async fn set_with(&self, key: &str, value: T, options: ItemOptions) -> Result<()> {
        let conn = self.connection()?;
        let full_key = self.key(key);

        let finish = self.inner.instrumenter.observe(Operation::Set, &[&full_key]);
        let result = self
            .write(&conn, &full_key, &value, options.resolve_ttl(self.inner.ttl))
            .await;
        finish(result.as_ref().err());
        result
    }

    /// Uses `GETDEL`, so the read and the removal are one atomic step.
    async fn pop(&self, key: &str) -> Result<T> {
        let conn = self.connection()?;
        let full_key = self.key(key);

        let finish_get = self.inner.instrumenter.observe(Operation::Get, &[&full_key]);
        let finish_delete = self
            .inner
            .instrumenter
            .observe(Operation::Delete, &[&full_key]);

        let result = match conn
            .query::<Option<Vec<u8>>>(redis::cmd("GETDEL").arg(&full_key))
            .await
        {
            Ok(Some(bytes)) => {
                debug!("✓ Redis POP {}", full_key);
                decode(&bytes)
            }
            Ok(None) => {
                debug!("✓ Redis POP {} -> MISS", full_key);
                Err(Error::KeyNotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => Err(e),
        };

        // A missing key is a successful round trip for the hook.
        let observed = result.as_ref().err().filter(|e| !e.is_not_found());
        finish_delete(observed);
        finish_get(observed);
        result
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let conn = self.connection()?;
        let full_key = self.key(key);

        let finish = self
            .inner
            .instrumenter
            .observe(Operation::Delete, &[&full_key]);
        let result = conn.query::<()>(redis::cmd("DEL").arg(&full_key)).await;
        if result.is_ok() {
            debug!("✓ Redis DELETE {}", full_key);
        }
        finish(result.as_ref().err());
        result
    }

    async fn close(&self) -> Result<()> {
        let taken = self.inner.connection.write().take();
        if let Some(conn) = taken {
            if self.inner.owns_connection {
                conn.close();
            }
            debug!("✓ Redis instance {} closed", self.inner.prefix);
        }
        Ok(())
    }
}
