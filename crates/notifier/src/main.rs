//! Courier notification worker.
//!
//! Connects to PostgreSQL and the Redis broker (degrading to the simulated
//! queue if Redis is down), sweeps stale notifications, then consumes the
//! notification queue until Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_common::types::NotificationType;

use courier_notifier::queue::{QueueConfig, QueueService, RedisConnector};
use courier_notifier::recovery::RecoverySweeper;
use courier_notifier::registry::ChannelRegistry;
use courier_notifier::retry::RetryPolicy;
use courier_notifier::service::NotificationService;
use courier_notifier::store::{NotificationStore, PgNotificationStore};
use courier_notifier::transport::{ChannelTransport, HttpTransport, InboxTransport, LogTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Courier worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let store: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(pool.clone()));

    // Queue: Redis when reachable, simulated otherwise
    let connector = Arc::new(RedisConnector::new(
        config.redis_url.clone(),
        config.queue_name.clone(),
        Duration::from_millis(config.queue_connect_timeout_ms),
    ));
    let queue = QueueService::new(connector, QueueConfig::from_config(&config));
    let mode = queue.connect().await;
    tracing::info!(mode = ?mode, simulating = queue.is_simulating(), "Queue ready");

    let channels = Arc::new(build_channels(&config, pool.clone())?);

    let service = Arc::new(NotificationService::new(
        store.clone(),
        queue.clone(),
        channels,
        RetryPolicy::from_config(&config),
        config.dispatch_timeout(),
    ));

    // Recover anything a previous run left behind before taking new work
    let sweeper = Arc::new(RecoverySweeper::from_config(store, queue.clone(), &config));
    match sweeper.sweep().await {
        Ok(report) => tracing::info!(requeued = report.requeued, "Startup recovery sweep complete"),
        Err(e) => tracing::error!(error = %e, "Startup recovery sweep failed"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_task = tokio::spawn({
        let sweeper = sweeper.clone();
        async move { sweeper.run(shutdown_rx).await }
    });

    let consumers = queue.consume(service, config.worker_concurrency);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");

    consumers.shutdown_and_join(config.shutdown_grace()).await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::error!(error = %e, "Recovery sweeper task failed");
    }
    queue.close().await;
    pool.close().await;

    tracing::info!("Courier worker stopped.");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("courier_notifier=info,courier_common=info"));

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Build the dispatch table. Email and SMS go to their provider relay when
/// configured and are logged otherwise; in-app writes to the inbox table.
fn build_channels(config: &AppConfig, pool: sqlx::PgPool) -> anyhow::Result<ChannelRegistry> {
    let client = reqwest::Client::builder()
        .timeout(config.dispatch_timeout())
        .build()?;

    let mut registry = ChannelRegistry::new();
    for (channel, endpoint) in [
        (NotificationType::Email, &config.email_provider_url),
        (NotificationType::Sms, &config.sms_provider_url),
    ] {
        let transport: Arc<dyn ChannelTransport> = match endpoint {
            Some(url) => Arc::new(
                HttpTransport::new(client.clone(), channel, url.clone())
                    .with_api_key(config.provider_api_key.clone()),
            ),
            None => {
                tracing::warn!(channel = %channel, "No provider configured, deliveries will only be logged");
                Arc::new(LogTransport::new(channel))
            }
        };
        registry.register(channel, transport)?;
    }
    registry.register(NotificationType::InApp, Arc::new(InboxTransport::new(pool)))?;

    Ok(registry)
}
