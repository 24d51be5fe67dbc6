use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};

use crate::StopToken;

/// Why [`EventQueue::pop`] returned without an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("stop requested")]
    Stopped,

    #[error("queue timed out")]
    TimedOut,
}

/// FIFO handoff queue between producer tasks and one consumer loop
///
/// `pop` waits until an item arrives, the stop token fires, or the optional
/// wait elapses. Items come out in the order they were pushed.
#[derive(Debug)]
pub struct EventQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueue an item and wake one waiting consumer
    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.notify.notify_one();
    }

    /// Take the front item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait for the front item
    pub async fn pop(&self, stop: &StopToken, wait: Option<Duration>) -> Result<T, QueueError> {
        let deadline = wait.map(|wait| Instant::now() + wait);

        loop {
            if let Some(item) = self.try_pop() {
                return Ok(item);
            }
            if stop.is_stopped() {
                return Err(QueueError::Stopped);
            }

            let timer = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            // notify_one leaves a permit behind when nobody is waiting, so a push
            // racing with the try_pop above still wakes this wait
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = stop.stopped() => return Err(QueueError::Stopped),
                _ = timer => return Err(QueueError::TimedOut),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        // A poisoned queue still holds valid items
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
