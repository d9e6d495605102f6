use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use courier_common::types::Notification;

use super::{HandlerOutcome, QueueError, QueueService};

/// Receives each delivered envelope exactly once per delivery.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, notification: Notification) -> HandlerOutcome;
}

/// A group of consumer workers sharing one queue.
///
/// Shutdown is cooperative: workers stop taking new deliveries and finish the
/// one in hand. `shutdown_and_join` waits up to a grace period for that.
pub struct ConsumerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ConsumerGroup {
    pub fn spawn(n: usize, queue: Arc<QueueService>, handler: Arc<dyn EnvelopeHandler>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let handler = Arc::clone(&handler);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    consume_loop(worker_id, queue, handler, shutdown_rx).await;
                })
            })
            .collect();

        tracing::info!(workers = n, "Consumer group started");
        Self { shutdown_tx, joins }
    }

    /// Stop taking new deliveries. In-flight handlers are not interrupted.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Request shutdown and wait for workers, aborting any still busy after `grace`.
    pub async fn shutdown_and_join(self, grace: Duration) {
        self.request_shutdown();

        let deadline = tokio::time::Instant::now() + grace;
        for mut join in self.joins {
            match tokio::time::timeout_at(deadline, &mut join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Consumer worker panicked"),
                Err(_) => {
                    tracing::warn!("Consumer worker exceeded shutdown grace period, aborting");
                    join.abort();
                }
            }
        }

        tracing::info!("Consumer group stopped");
    }
}

/// Longest pause before requeueing after consecutive `Requeue` outcomes.
const MAX_REQUEUE_PAUSE: Duration = Duration::from_secs(30);

/// `base * 2^(streak - 1)`, capped at [`MAX_REQUEUE_PAUSE`].
fn requeue_pause(base: Duration, streak: u32) -> Duration {
    let factor = 1u32 << streak.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(MAX_REQUEUE_PAUSE)
}

async fn consume_loop(
    worker_id: usize,
    queue: Arc<QueueService>,
    handler: Arc<dyn EnvelopeHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let wait = queue.config().receive_wait;
    let mut requeue_streak: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Not raced against shutdown: dropping a broker receive mid-flight
        // could strand an envelope. `receive_wait` bounds shutdown latency.
        let delivery = match queue.receive(wait).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(QueueError::Closed) => break,
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "Queue receive failed");
                tokio::time::sleep(wait).await;
                continue;
            }
        };

        let notification = match delivery.decode() {
            Ok(notification) => notification,
            Err(e) => {
                // A malformed envelope would fail forever; drop it.
                tracing::error!(
                    worker_id,
                    error = %e,
                    payload = delivery.payload(),
                    "Dropping undecodable envelope"
                );
                queue.settle(delivery, HandlerOutcome::Ack).await;
                continue;
            }
        };

        let outcome = handler.handle(notification).await;
        match outcome {
            HandlerOutcome::Ack => requeue_streak = 0,
            HandlerOutcome::Requeue => {
                // The handler could not record a result (store outage). Pause
                // before handing the envelope back, or it comes straight back.
                requeue_streak = requeue_streak.saturating_add(1);
                let pause = requeue_pause(wait, requeue_streak);
                tracing::debug!(
                    worker_id,
                    streak = requeue_streak,
                    pause_ms = pause.as_millis() as u64,
                    "Pausing before requeue"
                );
                if !*shutdown_rx.borrow() {
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
            }
        }
        queue.settle(delivery, outcome).await;
    }

    tracing::debug!(worker_id, "Consumer worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_pause_grows_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(requeue_pause(base, 1), Duration::from_millis(100));
        assert_eq!(requeue_pause(base, 2), Duration::from_millis(200));
        assert_eq!(requeue_pause(base, 4), Duration::from_millis(800));
        assert_eq!(requeue_pause(base, 20), MAX_REQUEUE_PAUSE);
        assert_eq!(requeue_pause(base, u32::MAX), MAX_REQUEUE_PAUSE);
    }
}
