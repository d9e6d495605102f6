use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (notification broker)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Name of the broker list that carries notification envelopes
    pub queue_name: String,

    /// Number of concurrent consumer workers (default: 4)
    pub worker_concurrency: usize,

    /// Retries allowed after the first attempt before a notification is FAILED (default: 3)
    pub max_retries: u32,

    /// Delay before the first re-publish, in milliseconds (default: 0 = immediate)
    pub retry_base_delay_ms: u64,

    /// Backoff multiplier between consecutive retries (default: 2.0)
    pub retry_multiplier: f64,

    /// Upper bound for a single retry delay, in milliseconds
    pub retry_max_delay_ms: u64,

    /// Whether a transport returning `false` counts as a transient failure (default: true)
    pub retry_on_rejection: bool,

    /// Per-dispatch transport timeout in milliseconds (default: 10000)
    pub dispatch_timeout_ms: u64,

    /// Broker connect timeout in milliseconds (default: 3000)
    pub queue_connect_timeout_ms: u64,

    /// How long a consumer blocks on an empty queue before re-checking shutdown
    pub queue_receive_wait_ms: u64,

    /// Whether a degraded queue keeps trying to reach the broker (default: true)
    pub queue_reconnect_enabled: bool,

    /// First reconnect delay in milliseconds
    pub queue_reconnect_interval_ms: u64,

    /// Reconnect delay ceiling in milliseconds
    pub queue_reconnect_max_interval_ms: u64,

    /// Maximum envelopes buffered by the in-process simulated queue
    pub simulated_queue_capacity: usize,

    /// Age after which a non-terminal notification is considered stuck
    pub recovery_stale_after_secs: u64,

    /// Interval between recovery sweeps
    pub recovery_interval_secs: u64,

    /// How long shutdown waits for in-flight deliveries
    pub shutdown_grace_secs: u64,

    /// Email provider relay endpoint (unset = log-only delivery)
    pub email_provider_url: Option<String>,

    /// SMS provider relay endpoint (unset = log-only delivery)
    pub sms_provider_url: Option<String>,

    /// Bearer key sent to the provider relays
    pub provider_api_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing, unparsable or inconsistent values fail with [`AppError::Config`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| {
                AppError::Config("DATABASE_URL environment variable is required".to_string())
            })?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10)?,
            queue_name: std::env::var("NOTIFICATION_QUEUE")
                .unwrap_or_else(|_| "notifications".to_string()),
            worker_concurrency: env_or("WORKER_CONCURRENCY", 4)?,
            max_retries: env_or("MAX_RETRIES", 3)?,
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 0)?,
            retry_multiplier: env_or("RETRY_MULTIPLIER", 2.0)?,
            retry_max_delay_ms: env_or("RETRY_MAX_DELAY_MS", 60_000)?,
            retry_on_rejection: env_or("RETRY_ON_REJECTION", true)?,
            dispatch_timeout_ms: env_or("DISPATCH_TIMEOUT_MS", 10_000)?,
            queue_connect_timeout_ms: env_or("QUEUE_CONNECT_TIMEOUT_MS", 3_000)?,
            queue_receive_wait_ms: env_or("QUEUE_RECEIVE_WAIT_MS", 1_000)?,
            queue_reconnect_enabled: env_or("QUEUE_RECONNECT_ENABLED", true)?,
            queue_reconnect_interval_ms: env_or("QUEUE_RECONNECT_INTERVAL_MS", 1_000)?,
            queue_reconnect_max_interval_ms: env_or("QUEUE_RECONNECT_MAX_INTERVAL_MS", 30_000)?,
            simulated_queue_capacity: env_or("SIMULATED_QUEUE_CAPACITY", 10_000)?,
            recovery_stale_after_secs: env_or("RECOVERY_STALE_AFTER_SECS", 300)?,
            recovery_interval_secs: env_or("RECOVERY_INTERVAL_SECS", 60)?,
            shutdown_grace_secs: env_or("SHUTDOWN_GRACE_SECS", 30)?,
            email_provider_url: std::env::var("EMAIL_PROVIDER_URL").ok(),
            sms_provider_url: std::env::var("SMS_PROVIDER_URL").ok(),
            provider_api_key: std::env::var("PROVIDER_API_KEY").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("DB_MAX_CONNECTIONS", self.db_max_connections as u64),
            ("WORKER_CONCURRENCY", self.worker_concurrency as u64),
            ("SIMULATED_QUEUE_CAPACITY", self.simulated_queue_capacity as u64),
            ("DISPATCH_TIMEOUT_MS", self.dispatch_timeout_ms),
            ("QUEUE_RECEIVE_WAIT_MS", self.queue_receive_wait_ms),
            ("QUEUE_RECONNECT_INTERVAL_MS", self.queue_reconnect_interval_ms),
            ("RECOVERY_INTERVAL_SECS", self.recovery_interval_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than 0", key)));
            }
        }

        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(AppError::Config(format!(
                "RETRY_MULTIPLIER must be at least 1.0, got {}",
                self.retry_multiplier
            )));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(AppError::Config(
                "RETRY_MAX_DELAY_MS must not be below RETRY_BASE_DELAY_MS".to_string(),
            ));
        }
        if self.queue_reconnect_max_interval_ms < self.queue_reconnect_interval_ms {
            return Err(AppError::Config(
                "QUEUE_RECONNECT_MAX_INTERVAL_MS must not be below QUEUE_RECONNECT_INTERVAL_MS"
                    .to_string(),
            ));
        }

        // A live attempt holds PROCESSING for up to the dispatch timeout; the
        // sweep must not treat it as stuck before then.
        if self.recovery_stale_after_secs.saturating_mul(1000) <= self.dispatch_timeout_ms {
            return Err(AppError::Config(format!(
                "RECOVERY_STALE_AFTER_SECS ({}s) must exceed DISPATCH_TIMEOUT_MS ({}ms)",
                self.recovery_stale_after_secs, self.dispatch_timeout_ms
            )));
        }

        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Read and parse an optional variable, falling back to `default` when unset.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            AppError::Config(format!(
                "{} must be a valid {}",
                key,
                std::any::type_name::<T>()
            ))
        }),
        Err(_) => Ok(default),
    }
}
