//! [`RemoteStore`] backed by Redis, via `ConnectionManager` for
//! transparent reconnection.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use crate::remote::{RemoteStore, ScanPage, StoreError};

const SCAN_COUNT_HINT: usize = 100;

fn connection_error(err: redis::RedisError) -> StoreError {
    StoreError::Connection(Box::new(err))
}

fn command_error(err: redis::RedisError) -> StoreError {
    StoreError::Command(Box::new(err))
}

/// A `RemoteStore` over one or more Redis masters.
///
/// A single-node deployment only ever needs the primary connection.
/// When constructed `with_masters`, [`RemoteStore::scan_keys`]'s
/// default cursor loop is overridden to fan the same SCAN loop out
/// across every configured master concurrently, since a real Redis
/// Cluster keyspace is sharded and no single node sees every key.
pub struct RedisStore {
    primary: ConnectionManager,
    masters: Vec<ConnectionManager>,
}

impl RedisStore {
    /// Connect using `REDIS_URL`, defaulting to the local Redis port.
    pub async fn new() -> Result<Self, StoreError> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Self::with_url(&redis_url).await
    }

    /// Connect to a single Redis node.
    pub async fn with_url(redis_url: &str) -> Result<Self, StoreError> {
        info!(redis_url = %redis_url, "connecting to Redis");
        let client = Client::open(redis_url).map_err(connection_error)?;
        let conn = ConnectionManager::new(client).await.map_err(connection_error)?;

        let mut ping_conn = conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut ping_conn)
            .await
            .map_err(connection_error)?;

        info!(redis_url = %redis_url, "Redis connection established");
        Ok(Self {
            primary: conn,
            masters: Vec::new(),
        })
    }

    /// Connect to a sharded deployment's master nodes. `scan_keys`
    /// fans out across all of them; every other operation is routed
    /// through `primary` (the caller is expected to pass a primary
    /// that itself talks to the correct shard, e.g. via a cluster
    /// client, when single-key operations must be shard-aware).
    pub async fn with_masters(primary_url: &str, master_urls: &[String]) -> Result<Self, StoreError> {
        let mut store = Self::with_url(primary_url).await?;
        for url in master_urls {
            let client = Client::open(url.as_str()).map_err(connection_error)?;
            let conn = ConnectionManager::new(client).await.map_err(connection_error)?;
            store.masters.push(conn);
        }
        Ok(store)
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.primary.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(command_error)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.primary.clone();
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value.to_vec(), secs).await.map_err(command_error)?;
        debug!(key = %key, ttl_secs = secs, "wrote key to Redis");
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.primary.clone();
        let removed: u64 = conn.del(keys).await.map_err(command_error)?;
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.primary.clone();
        let value: i64 = conn.incr(key, 1).await.map_err(command_error)?;
        Ok(value)
    }

    async fn scan(&self, cursor: u64, pattern: &str, batch: usize) -> Result<ScanPage, StoreError> {
        let mut conn = self.primary.clone();
        let count = if batch == 0 { SCAN_COUNT_HINT } else { batch };
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(ScanPage {
            cursor: next_cursor,
            keys,
        })
    }

    async fn scan_keys(&self, pattern: &str, batch: usize) -> Result<Vec<String>, StoreError> {
        if self.masters.is_empty() {
            return scan_one_master(self.primary.clone(), pattern, batch).await;
        }

        let scans = self.masters.iter().map(|conn| {
            let conn = conn.clone();
            let pattern = pattern.to_string();
            async move { scan_one_master(conn, &pattern, batch).await }
        });

        let pages = futures_util::future::join_all(scans).await;
        let mut keys = Vec::new();
        for page in pages {
            keys.extend(page?);
        }
        Ok(keys)
    }

    fn is_cluster(&self) -> bool {
        !self.masters.is_empty()
    }
}

async fn scan_one_master(
    mut conn: ConnectionManager,
    pattern: &str,
    batch: usize,
) -> Result<Vec<String>, StoreError> {
    let count = if batch == 0 { SCAN_COUNT_HINT } else { batch };
    let mut cursor: u64 = 0;
    let mut keys = Vec::new();
    loop {
        let (next_cursor, page): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        keys.extend(page);
        cursor = next_cursor;
        if cursor == 0 {
            break;
        }
    }
    Ok(keys)
}
