use std::time::Duration;

use redis::Client;
use redis::aio::ConnectionManager;

/// Create a Redis connection manager for async operations.
///
/// `ConnectionManager` retries internally on an unreachable server, so the
/// attempt is bounded by `connect_timeout` to let callers degrade instead.
pub async fn create_redis_pool(
    redis_url: &str,
    connect_timeout: Duration,
) -> anyhow::Result<(Client, ConnectionManager)> {
    let client = Client::open(redis_url)?;
    let manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client.clone()))
        .await
        .map_err(|_| {
            anyhow::anyhow!("Timed out after {:?} connecting to Redis", connect_timeout)
        })??;

    tracing::info!("Connected to Redis");
    Ok((client, manager))
}
