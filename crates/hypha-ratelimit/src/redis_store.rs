//! Redis-backed [`CounterStore`], shared by every server process pointed at
//! the same instance.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::info;

use crate::errors::CounterStoreError;
use crate::store::CounterStore;

/// Counters kept in Redis via `INCR`, `EXPIRE` and `TTL`.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: MultiplexedConnection,
}

impl RedisCounterStore {
    /// Connect to `url` (`redis://host:port/db`).
    pub async fn connect(url: &str) -> Result<Self, CounterStoreError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!("connected to redis counter store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, CounterStoreError> {
        let mut conn = self.connection.clone();
        let value: u64 = conn.incr(key, 1_u64).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), CounterStoreError> {
        let mut conn = self.connection.clone();
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        let _: bool = conn.expire(key, seconds).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<i64, CounterStoreError> {
        let mut conn = self.connection.clone();
        let ttl: i64 = conn.ttl(key).await?;
        Ok(ttl)
    }
}
