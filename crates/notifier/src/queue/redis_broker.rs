//! Redis broker: a reliable list queue.
//!
//! Producers `LPUSH` onto `<queue>`. Consumers `BLMOVE` the oldest envelope
//! from `<queue>` into `<queue>:processing`, and acknowledge with `LREM` once
//! the handler is done. A requeue removes the processing entry and pushes the
//! envelope back onto `<queue>` in one `MULTI`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;

use courier_common::redis_pool::create_redis_pool;

use super::{Broker, BrokerConnector, QueueError};

/// Opens [`RedisBroker`]s against a fixed URL and queue name.
pub struct RedisConnector {
    redis_url: String,
    queue_name: String,
    connect_timeout: Duration,
}

impl RedisConnector {
    pub fn new(redis_url: String, queue_name: String, connect_timeout: Duration) -> Self {
        Self {
            redis_url,
            queue_name,
            connect_timeout,
        }
    }
}

#[async_trait]
impl BrokerConnector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn Broker>, QueueError> {
        let (client, manager) = create_redis_pool(&self.redis_url, self.connect_timeout)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        Ok(Arc::new(RedisBroker::new(client, manager, &self.queue_name)))
    }
}

pub struct RedisBroker {
    client: Client,
    /// Shared connection for non-blocking commands.
    manager: ConnectionManager,
    /// Dedicated connections for `BLMOVE`, which would otherwise stall every
    /// other command pipelined on a shared connection.
    blocking: Mutex<Vec<MultiplexedConnection>>,
    queue_key: String,
    processing_key: String,
}

impl RedisBroker {
    pub fn new(client: Client, manager: ConnectionManager, queue_name: &str) -> Self {
        Self {
            client,
            manager,
            blocking: Mutex::new(Vec::new()),
            queue_key: queue_name.to_string(),
            processing_key: format!("{}:processing", queue_name),
        }
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection, QueueError> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, payload: String) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        conn.lpush::<_, _, ()>(&self.queue_key, payload).await?;
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self.checkout_blocking().await?;

        // BLMOVE takes a fractional timeout in seconds; 0 would block forever.
        let timeout_secs = wait.as_secs_f64().max(0.01);
        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.queue_key)
            .arg(&self.processing_key)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        self.blocking.lock().await.push(conn);
        Ok(payload)
    }

    async fn ack(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        conn.lrem::<_, _, ()>(&self.processing_key, 1, payload)
            .await?;
        Ok(())
    }

    async fn requeue(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .lrem(&self.processing_key, 1, payload)
            .ignore()
            .lpush(&self.queue_key, payload)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.blocking.lock().await.clear();
        tracing::info!(queue = %self.queue_key, "Redis broker closed");
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
