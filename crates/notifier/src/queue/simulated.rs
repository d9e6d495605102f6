//! In-process fallback queue used while no broker connection is available.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::QueueError;

/// Bounded FIFO of serialized envelopes with wake-up on push.
pub struct SimulatedQueue {
    buffer: Mutex<VecDeque<String>>,
    notify: Notify,
    capacity: usize,
}

impl SimulatedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Append a freshly published envelope. Fails once `capacity` envelopes are
    /// waiting so producers can pause instead of buffering without bound.
    pub async fn push(&self, payload: String) -> Result<(), QueueError> {
        {
            let mut buffer = self.buffer.lock().await;
            if buffer.len() >= self.capacity {
                return Err(QueueError::Backpressure(self.capacity));
            }
            buffer.push_back(payload);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Re-append an already-accepted envelope to the tail. Not subject to the
    /// capacity limit: the envelope was counted when it was first published.
    pub async fn requeue(&self, payload: String) {
        self.buffer.lock().await.push_back(payload);
        self.notify.notify_one();
    }

    /// Take the oldest envelope, waiting up to `wait` for one to arrive.
    pub async fn pop(&self, wait: Duration) -> Option<String> {
        let deadline = Instant::now() + wait;
        loop {
            // Register interest before checking so a push between the check and
            // the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.buffer.lock().await.pop_front() {
                return Some(payload);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Remove and return everything currently buffered, oldest first.
    pub async fn drain(&self) -> Vec<String> {
        self.buffer.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
