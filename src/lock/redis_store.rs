//! lock::redis_store
//!
//! Redis-backed [`LockStore`].
//!
//! One [`ConnectionManager`] is shared by all tasks. It multiplexes commands
//! over a single connection and reconnects after failures, so cloning the
//! store is cheap.
//!
//! # Commands
//!
//! - `SET key value NX PX ttl` for set-if-absent
//! - `GET` / `DEL`
//! - a Lua compare-and-delete script for releasing owned keys

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::store::{LockStore, StoreError};

const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Lock store backed by a Redis server.
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    address: String,
}

impl std::fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockStore")
            .field("address", &self.address)
            .finish()
    }
}

impl RedisLockStore {
    /// Connect to the first configured address.
    ///
    /// Bare `host:port` addresses get a `redis://` scheme.
    pub async fn connect(addresses: &[String]) -> Result<Self, StoreError> {
        let address = addresses
            .first()
            .ok_or_else(|| StoreError::InvalidAddress("no addresses configured".into()))?;
        let url = connection_url(address);

        let client = redis::Client::open(url.as_str())
            .map_err(|e| StoreError::InvalidAddress(format!("{}: {}", address, e)))?;
        let conn = ConnectionManager::new(client).await.map_err(from_redis)?;

        info!(address = %address, "connected to redis lock store");
        Ok(Self {
            conn,
            address: address.clone(),
        })
    }
}

fn connection_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

fn from_redis(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(from_redis)?;
        debug!(key, set = reply.is_some(), "SET NX");
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(from_redis)?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(from_redis)?;
        Ok(removed)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(COMPARE_AND_DELETE);
        let removed: i64 = script
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(from_redis)?;
        Ok(removed == 1)
    }
}
