//! The durable work queue surface.

use async_trait::async_trait;
use forge_core::ForgeResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Blocking FIFO list of serialized job envelopes.
///
/// Durability is the backing transport's concern; this surface only models
/// push-to-tail and blocking-pop-with-timeout.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Push a payload onto the tail of the queue
    async fn push(&self, payload: String) -> ForgeResult<()>;

    /// Pop the head of the queue, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout so callers can periodically re-check a
    /// stop flag.
    async fn pop(&self, timeout: Duration) -> ForgeResult<Option<String>>;

    /// Number of queued payloads
    async fn len(&self) -> usize;

    /// Whether the queue is empty
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory queue with the same blocking-pop semantics as the durable
/// transport.
#[derive(Debug, Default)]
pub struct MemoryWorkQueue {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl MemoryWorkQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn push(&self, payload: String) -> ForgeResult<()> {
        self.items.lock().push_back(payload);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> ForgeResult<Option<String>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(payload) = self.items.lock().pop_front() {
                return Ok(Some(payload));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // A push between the check and this wait re-notifies; the
            // bounded wait also covers a missed wakeup.
            let _ = tokio::time::timeout_at(deadline, self.notify.notified()).await;
        }
    }

    async fn len(&self) -> usize {
        self.items.lock().len()
    }
}
