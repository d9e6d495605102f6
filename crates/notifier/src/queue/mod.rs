//! Queue service: hands notification envelopes from producers to consumers.
//!
//! The service owns one broker connection for the whole process. When the
//! broker cannot be reached it degrades to an in-process [`SimulatedQueue`]
//! and raises the `simulating` flag instead of failing the caller. A
//! background task then keeps retrying the broker (when enabled) and, once it
//! is back, drains the simulated buffer into it.
//!
//! Lifecycle: `Uninitialized -> Connected | Degraded -> Closed`.

mod consumer;
mod redis_broker;
mod simulated;

pub use consumer::{ConsumerGroup, EnvelopeHandler};
pub use redis_broker::{RedisBroker, RedisConnector};
pub use simulated::SimulatedQueue;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, watch};

use courier_common::config::AppConfig;
use courier_common::error::AppError;
use courier_common::types::Notification;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker error: {0}")]
    Broker(#[from] ::redis::RedisError),

    #[error("Envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Simulated queue is full ({0} envelopes), pause publishing")]
    Backpressure(usize),

    #[error("Queue is closed")]
    Closed,
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Broker(e) => AppError::Redis(e),
            other => AppError::Queue(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Uninitialized,
    Connected,
    /// Running on the simulated queue.
    Degraded,
    Closed,
}

/// Consumer verdict on a delivered envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Done with it; remove the message.
    Ack,
    /// Could not record a result; deliver it again.
    Requeue,
}

/// How an envelope enters the simulated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Buffering {
    /// New envelope, subject to the capacity limit.
    Publish,
    /// Already-accepted envelope going back to the tail.
    Requeue,
}

/// A message broker speaking in serialized envelopes.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, payload: String) -> Result<(), QueueError>;

    /// Wait up to `wait` for the next envelope. The envelope stays owned by
    /// the broker until it is acked or requeued.
    async fn receive(&self, wait: Duration) -> Result<Option<String>, QueueError>;

    async fn ack(&self, payload: &str) -> Result<(), QueueError>;

    async fn requeue(&self, payload: &str) -> Result<(), QueueError>;

    async fn close(&self) {}

    fn name(&self) -> &'static str;
}

/// Establishes broker connections. Kept separate from [`Broker`] so the queue
/// service can reconnect, and so tests can inject unreachable brokers.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Broker>, QueueError>;
}

/// Where a delivery came from, i.e. how to settle it.
enum Receipt {
    Broker(Arc<dyn Broker>),
    Simulated,
}

/// One received envelope, awaiting [`QueueService::settle`].
pub struct Delivery {
    payload: String,
    receipt: Receipt,
}

impl Delivery {
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn decode(&self) -> Result<Notification, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.receipt, Receipt::Simulated)
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub connect_timeout: Duration,
    /// Longest a single `receive` blocks on an empty queue.
    pub receive_wait: Duration,
    pub reconnect_enabled: bool,
    pub reconnect_interval: Duration,
    pub reconnect_max_interval: Duration,
    pub simulated_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            receive_wait: Duration::from_secs(1),
            reconnect_enabled: true,
            reconnect_interval: Duration::from_secs(1),
            reconnect_max_interval: Duration::from_secs(30),
            simulated_capacity: 10_000,
        }
    }
}

impl QueueConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.queue_connect_timeout_ms),
            receive_wait: Duration::from_millis(config.queue_receive_wait_ms),
            reconnect_enabled: config.queue_reconnect_enabled,
            reconnect_interval: Duration::from_millis(config.queue_reconnect_interval_ms),
            reconnect_max_interval: Duration::from_millis(config.queue_reconnect_max_interval_ms),
            simulated_capacity: config.simulated_queue_capacity,
        }
    }
}

pub struct QueueService {
    connector: Arc<dyn BrokerConnector>,
    config: QueueConfig,
    broker: RwLock<Option<Arc<dyn Broker>>>,
    simulated: SimulatedQueue,
    /// Serializes the first (lazy) connect.
    init_lock: Mutex<()>,
    initialized: AtomicBool,
    simulating: AtomicBool,
    reconnecting: AtomicBool,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl QueueService {
    pub fn new(connector: Arc<dyn BrokerConnector>, config: QueueConfig) -> Arc<Self> {
        let (closed_tx, _) = watch::channel(false);
        Arc::new(Self {
            connector,
            simulated: SimulatedQueue::new(config.simulated_capacity),
            config,
            broker: RwLock::new(None),
            init_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
            simulating: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closed_tx,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// True while envelopes flow through the in-process simulated queue.
    pub fn is_simulating(&self) -> bool {
        self.simulating.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> QueueMode {
        if self.closed.load(Ordering::SeqCst) {
            QueueMode::Closed
        } else if !self.initialized.load(Ordering::SeqCst) {
            QueueMode::Uninitialized
        } else if self.is_simulating() {
            QueueMode::Degraded
        } else {
            QueueMode::Connected
        }
    }

    /// Envelopes currently waiting in the simulated buffer.
    pub async fn simulated_backlog(&self) -> usize {
        self.simulated.len().await
    }

    /// Connect to the broker, or fall back to the simulated queue. Never fails.
    pub async fn connect(self: &Arc<Self>) -> QueueMode {
        let _guard = self.init_lock.lock().await;
        self.establish().await
    }

    /// Connect attempt proper; callers hold `init_lock`.
    async fn establish(self: &Arc<Self>) -> QueueMode {
        if self.closed.load(Ordering::SeqCst) {
            return QueueMode::Closed;
        }

        match self.try_connect().await {
            Ok(broker) => {
                tracing::info!(broker = broker.name(), "Queue connected to broker");
                *self.broker.write().await = Some(broker);
                self.simulating.store(false, Ordering::SeqCst);
                self.initialized.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Queue broker unavailable, falling back to simulated queue"
                );
                self.initialized.store(true, Ordering::SeqCst);
                self.enter_degraded();
            }
        }

        self.mode()
    }

    /// Publish one notification envelope.
    ///
    /// Connects lazily on first use. A broker failure degrades the service and
    /// the envelope goes to the simulated queue instead of being lost.
    pub async fn publish(self: &Arc<Self>, notification: &Notification) -> Result<(), QueueError> {
        self.ensure_initialized().await?;
        let payload = serde_json::to_string(notification)?;
        self.hand_off(payload, Buffering::Publish).await?;

        tracing::debug!(
            notification_id = %notification.id,
            status = %notification.status,
            simulated = self.is_simulating(),
            "Envelope published"
        );
        Ok(())
    }

    /// Receive the next envelope, waiting up to `wait`.
    pub async fn receive(self: &Arc<Self>, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        self.ensure_initialized().await?;

        let broker = self.broker.read().await.clone();
        match broker {
            Some(broker) => match broker.receive(wait).await {
                Ok(payload) => Ok(payload.map(|payload| Delivery {
                    payload,
                    receipt: Receipt::Broker(broker),
                })),
                Err(e) => {
                    tracing::warn!(error = %e, "Broker receive failed");
                    self.degrade_from(&broker).await;
                    Ok(None)
                }
            },
            None => Ok(self.simulated.pop(wait).await.map(|payload| Delivery {
                payload,
                receipt: Receipt::Simulated,
            })),
        }
    }

    /// Acknowledge or requeue a delivery.
    pub async fn settle(self: &Arc<Self>, delivery: Delivery, outcome: HandlerOutcome) {
        let Delivery { payload, receipt } = delivery;
        match (receipt, outcome) {
            (Receipt::Simulated, HandlerOutcome::Ack) => {}
            (Receipt::Simulated, HandlerOutcome::Requeue) => {
                // Back of the line, no delay. Prefer the broker if it came back.
                if let Err(e) = self.hand_off(payload, Buffering::Requeue).await {
                    tracing::warn!(error = %e, "Simulated requeue failed");
                }
            }
            (Receipt::Broker(broker), HandlerOutcome::Ack) => {
                if let Err(e) = broker.ack(&payload).await {
                    // The envelope may be redelivered later; consumers tolerate duplicates.
                    tracing::warn!(error = %e, "Broker ack failed");
                    self.degrade_from(&broker).await;
                }
            }
            (Receipt::Broker(broker), HandlerOutcome::Requeue) => {
                if let Err(e) = broker.requeue(&payload).await {
                    tracing::warn!(error = %e, "Broker requeue failed, moving envelope to simulated queue");
                    self.degrade_from(&broker).await;
                    if let Err(e) = self.hand_off(payload, Buffering::Requeue).await {
                        tracing::warn!(error = %e, "Simulated requeue failed");
                    }
                }
            }
        }
    }

    /// Start `workers` consumers that feed every delivered envelope to `handler`.
    pub fn consume(
        self: &Arc<Self>,
        handler: Arc<dyn EnvelopeHandler>,
        workers: usize,
    ) -> ConsumerGroup {
        ConsumerGroup::spawn(workers, Arc::clone(self), handler)
    }

    /// Stop reconnecting, refuse new publishes, and release the broker.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.closed_tx.send(true);

        if let Some(broker) = self.broker.write().await.take() {
            broker.close().await;
        }

        let stranded = self.simulated.len().await;
        if stranded > 0 {
            tracing::warn!(
                stranded,
                "Queue closed with envelopes left in the simulated queue; recovery sweep will re-enqueue them"
            );
        }
        tracing::info!("Queue service closed");
    }

    async fn ensure_initialized(self: &Arc<Self>) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        if !self.initialized.load(Ordering::SeqCst) {
            let _guard = self.init_lock.lock().await;
            if !self.initialized.load(Ordering::SeqCst) {
                self.establish().await;
            }
        }
        Ok(())
    }

    async fn try_connect(&self) -> Result<Arc<dyn Broker>, QueueError> {
        match tokio::time::timeout(self.config.connect_timeout, self.connector.connect()).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Unavailable(format!(
                "connect timed out after {:?}",
                self.config.connect_timeout
            ))),
        }
    }

    /// Send `payload` to the active broker, or buffer it in the simulated queue
    /// when there is none.
    ///
    /// The broker read guard is held across the buffer push: `promote` takes
    /// the write lock before draining, so it cannot drain between our `None`
    /// check and the push and leave the envelope behind.
    async fn hand_off(self: &Arc<Self>, payload: String, mode: Buffering) -> Result<(), QueueError> {
        loop {
            if self.closed.load(Ordering::SeqCst) && mode == Buffering::Publish {
                return Err(QueueError::Closed);
            }

            let guard = self.broker.read().await;
            let broker = match guard.as_ref() {
                Some(broker) => Arc::clone(broker),
                None => {
                    return match mode {
                        Buffering::Publish => self.simulated.push(payload).await,
                        Buffering::Requeue => {
                            self.simulated.requeue(payload).await;
                            Ok(())
                        }
                    };
                }
            };
            drop(guard);

            match broker.publish(payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "Broker publish failed, using simulated queue");
                    self.degrade_from(&broker).await;
                }
            }
        }
    }

    /// Drop `failed` if it is still the active broker and switch to simulated mode.
    async fn degrade_from(self: &Arc<Self>, failed: &Arc<dyn Broker>) {
        {
            let mut guard = self.broker.write().await;
            match guard.as_ref() {
                Some(current) if Arc::ptr_eq(current, failed) => {
                    *guard = None;
                }
                // Another worker already handled this failure.
                _ => return,
            }
        }

        tracing::warn!(broker = failed.name(), "Lost broker connection, queue degraded");
        self.enter_degraded();
    }

    fn enter_degraded(self: &Arc<Self>) {
        self.simulating.store(true, Ordering::SeqCst);

        if !self.config.reconnect_enabled || self.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.reconnect_loop().await;
        });
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let mut closed_rx = self.closed_tx.subscribe();
        let mut delay = self.config.reconnect_interval;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = closed_rx.changed() => break,
            }
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            match self.try_connect().await {
                Ok(broker) => {
                    if self.promote(broker).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, retry_in_ms = delay.as_millis() as u64, "Broker still unavailable");
                }
            }
            delay = (delay * 2).min(self.config.reconnect_max_interval);
        }

        self.reconnecting.store(false, Ordering::SeqCst);
    }

    /// Make `broker` the active broker and move the simulated backlog into it.
    /// Returns false if the backlog could not be handed over.
    async fn promote(&self, broker: Arc<dyn Broker>) -> bool {
        // Install before draining: once the write lock is held, no `hand_off`
        // is mid-push, and every later one goes to the broker.
        *self.broker.write().await = Some(Arc::clone(&broker));
        self.simulating.store(false, Ordering::SeqCst);

        let backlog = self.simulated.drain().await;
        let moved = backlog.len();
        let mut pending = backlog.into_iter();
        while let Some(payload) = pending.next() {
            if let Err(e) = broker.publish(payload.clone()).await {
                tracing::warn!(error = %e, "Broker failed while draining simulated backlog");
                self.simulated.requeue(payload).await;
                for rest in pending {
                    self.simulated.requeue(rest).await;
                }
                *self.broker.write().await = None;
                self.simulating.store(true, Ordering::SeqCst);
                return false;
            }
        }

        tracing::info!(
            broker = broker.name(),
            drained = moved,
            "Queue reconnected to broker"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::AtomicUsize;

    use chrono::Utc;
    use courier_common::types::{NotificationStatus, NotificationType};
    use uuid::Uuid;

    use super::*;

    struct Unreachable;

    #[async_trait]
    impl BrokerConnector for Unreachable {
        async fn connect(&self) -> Result<Arc<dyn Broker>, QueueError> {
            Err(QueueError::Unavailable("connection refused".to_string()))
        }
    }

    /// In-memory broker that can be told to start failing.
    #[derive(Default)]
    struct FakeBroker {
        queue: Mutex<VecDeque<String>>,
        in_flight: Mutex<Vec<String>>,
        failing: AtomicBool,
    }

    impl FakeBroker {
        fn check(&self) -> Result<(), QueueError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(QueueError::Unavailable("broker went away".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Broker for FakeBroker {
        async fn publish(&self, payload: String) -> Result<(), QueueError> {
            self.check()?;
            self.queue.lock().await.push_back(payload);
            Ok(())
        }

        async fn receive(&self, _wait: Duration) -> Result<Option<String>, QueueError> {
            self.check()?;
            let payload = self.queue.lock().await.pop_front();
            if let Some(p) = &payload {
                self.in_flight.lock().await.push(p.clone());
            }
            Ok(payload)
        }

        async fn ack(&self, payload: &str) -> Result<(), QueueError> {
            self.check()?;
            self.in_flight.lock().await.retain(|p| p != payload);
            Ok(())
        }

        async fn requeue(&self, payload: &str) -> Result<(), QueueError> {
            self.ack(payload).await?;
            self.queue.lock().await.push_back(payload.to_string());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    /// Fails the first `failures` connects, then hands out the shared broker.
    struct FlakyConnector {
        broker: Arc<FakeBroker>,
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl BrokerConnector for FlakyConnector {
        async fn connect(&self) -> Result<Arc<dyn Broker>, QueueError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(QueueError::Unavailable("not yet".to_string()));
            }
            Ok(self.broker.clone())
        }
    }

    fn fast_config() -> QueueConfig {
        QueueConfig {
            connect_timeout: Duration::from_millis(100),
            receive_wait: Duration::from_millis(20),
            reconnect_enabled: false,
            reconnect_interval: Duration::from_millis(10),
            reconnect_max_interval: Duration::from_millis(20),
            simulated_capacity: 100,
        }
    }

    fn make_notification() -> Notification {
        let now = Utc::now();
        Notification {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            notification_type: NotificationType::InApp,
            title: "Hi".to_string(),
            content: "There".to_string(),
            metadata: BTreeMap::new(),
            status: NotificationStatus::Pending,
            retry_count: 0,
            version: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_failed_connect_degrades() {
        let queue = QueueService::new(Arc::new(Unreachable), fast_config());
        assert_eq!(queue.mode(), QueueMode::Uninitialized);

        assert_eq!(queue.connect().await, QueueMode::Degraded);
        assert!(queue.is_simulating());
    }

    #[tokio::test]
    async fn test_simulated_publish_and_receive() {
        let queue = QueueService::new(Arc::new(Unreachable), fast_config());
        queue.connect().await;

        let n = make_notification();
        queue.publish(&n).await.unwrap();

        let delivery = queue.receive(Duration::from_millis(50)).await.unwrap().unwrap();
        assert!(delivery.is_simulated());
        assert_eq!(delivery.decode().unwrap().id, n.id);
        queue.settle(delivery, HandlerOutcome::Ack).await;

        assert!(queue.receive(Duration::from_millis(10)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_connects_lazily() {
        let queue = QueueService::new(Arc::new(Unreachable), fast_config());
        queue.publish(&make_notification()).await.unwrap();
        assert_eq!(queue.mode(), QueueMode::Degraded);
        assert_eq!(queue.simulated_backlog().await, 1);
    }

    #[tokio::test]
    async fn test_simulated_requeue_goes_to_tail() {
        let queue = QueueService::new(Arc::new(Unreachable), fast_config());
        let first = make_notification();
        let second = make_notification();
        queue.publish(&first).await.unwrap();
        queue.publish(&second).await.unwrap();

        let delivery = queue.receive(Duration::from_millis(50)).await.unwrap().unwrap();
        queue.settle(delivery, HandlerOutcome::Requeue).await;

        let next = queue.receive(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(next.decode().unwrap().id, second.id);
        let last = queue.receive(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(last.decode().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_broker_failure_falls_back_to_simulated() {
        let broker = Arc::new(FakeBroker::default());
        let connector = Arc::new(FlakyConnector {
            broker: broker.clone(),
            failures: 0,
            attempts: AtomicUsize::new(0),
        });
        let queue = QueueService::new(connector, fast_config());
        assert_eq!(queue.connect().await, QueueMode::Connected);

        broker.failing.store(true, Ordering::SeqCst);
        let n = make_notification();
        queue.publish(&n).await.unwrap();

        assert!(queue.is_simulating());
        let delivery = queue.receive(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(delivery.decode().unwrap().id, n.id);
    }

    #[tokio::test]
    async fn test_reconnect_drains_simulated_backlog() {
        let broker = Arc::new(FakeBroker::default());
        let connector = Arc::new(FlakyConnector {
            broker: broker.clone(),
            failures: 2,
            attempts: AtomicUsize::new(0),
        });
        let queue = QueueService::new(
            connector,
            QueueConfig {
                reconnect_enabled: true,
                ..fast_config()
            },
        );

        assert_eq!(queue.connect().await, QueueMode::Degraded);
        queue.publish(&make_notification()).await.unwrap();

        for _ in 0..100 {
            if queue.mode() == QueueMode::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(queue.mode(), QueueMode::Connected);
        assert_eq!(queue.simulated_backlog().await, 0);
        assert_eq!(broker.queue.lock().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_publishes_racing_reconnect_all_reach_broker() {
        const PUBLISHERS: usize = 8;
        const PER_PUBLISHER: usize = 300;
        let total = PUBLISHERS * PER_PUBLISHER;

        for _ in 0..20 {
            let broker = Arc::new(FakeBroker::default());
            let connector = Arc::new(FlakyConnector {
                broker: broker.clone(),
                failures: 1,
                attempts: AtomicUsize::new(0),
            });
            let queue = QueueService::new(
                connector,
                QueueConfig {
                    reconnect_enabled: true,
                    reconnect_interval: Duration::from_millis(1),
                    simulated_capacity: total,
                    ..fast_config()
                },
            );
            assert_eq!(queue.connect().await, QueueMode::Degraded);

            let publishers: Vec<_> = (0..PUBLISHERS)
                .map(|_| {
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        for _ in 0..PER_PUBLISHER {
                            queue.publish(&make_notification()).await.unwrap();
                        }
                    })
                })
                .collect();
            for publisher in publishers {
                publisher.await.unwrap();
            }

            for _ in 0..200 {
                if queue.mode() == QueueMode::Connected && queue.simulated_backlog().await == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            assert_eq!(queue.mode(), QueueMode::Connected);
            assert_eq!(queue.simulated_backlog().await, 0);
            assert_eq!(broker.queue.lock().await.len(), total);
        }
    }

    #[tokio::test]
    async fn test_closed_queue_refuses_publish() {
        let queue = QueueService::new(Arc::new(Unreachable), fast_config());
        queue.connect().await;
        queue.close().await;

        assert_eq!(queue.mode(), QueueMode::Closed);
        let err = queue.publish(&make_notification()).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }
}
