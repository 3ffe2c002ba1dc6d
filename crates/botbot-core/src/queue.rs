//! Inbound event queue contract.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::CoreResult;

/// A list-based queue of serialized packets, addressed by key.
#[async_trait]
pub trait EventQueue: Send + Sync + 'static {
    /// Pops the head of `key`, waiting at most `timeout` for a value.
    async fn pop(&self, key: &str, timeout: Duration) -> CoreResult<Option<String>>;

    /// Current length of `key`.
    async fn len(&self, key: &str) -> CoreResult<usize>;

    /// Appends a payload to the tail of `key`.
    async fn push(&self, key: &str, payload: String) -> CoreResult<()>;
}

/// In-memory [`EventQueue`].
#[derive(Debug, Default)]
pub struct MemoryQueue {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, key: &str) -> Option<String> {
        self.lists.lock().get_mut(key).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn pop(&self, key: &str, timeout: Duration) -> CoreResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.try_pop(key) {
                return Ok(Some(value));
            }
            if tokio::time::timeout_at(deadline, self.pushed.notified())
                .await
                .is_err()
            {
                return Ok(self.try_pop(key));
            }
        }
    }

    async fn len(&self, key: &str) -> CoreResult<usize> {
        Ok(self.lists.lock().get(key).map_or(0, VecDeque::len))
    }

    async fn push(&self, key: &str, payload: String) -> CoreResult<()> {
        self.lists
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(payload);
        self.pushed.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::new();
        queue.push("q", "first".into()).await.unwrap();
        queue.push("q", "second".into()).await.unwrap();
        assert_eq!(queue.len("q").await.unwrap(), 2);

        let timeout = Duration::from_millis(10);
        assert_eq!(queue.pop("q", timeout).await.unwrap().as_deref(), Some("first"));
        assert_eq!(queue.pop("q", timeout).await.unwrap().as_deref(), Some("second"));
        assert_eq!(queue.len("q").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let popped = queue.pop("q", Duration::from_secs(1)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_keys_are_separate() {
        let queue = MemoryQueue::new();
        queue.push("other", "x".into()).await.unwrap();
        assert!(queue.pop("q", Duration::from_millis(5)).await.unwrap().is_none());
        assert_eq!(queue.len("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(MemoryQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop("q", Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        queue.push("q", "late".into()).await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("late"));
    }
}
