//! Deduplicating work queue.
//!
//! Delivers reconcile requests keyed by a PodSet's namespace and name.
//! Guarantees of the queue:
//!
//! - a key pending in the queue is never enqueued twice
//! - a key handed to a worker is not handed out again until the worker
//!   calls [`WorkQueue::done`]; a key re-added while in flight is
//!   delivered once more after `done`
//!
//! Together these give at most one in-flight reconcile per key, which
//! serializes all writes for a given PodSet without any locking in the
//! reconcile algorithm itself.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Identity of a namespaced object, used as the reconcile request key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Creates a key from namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Default)]
struct QueueState {
    // Keys waiting to be handed to a worker, in arrival order
    queue: VecDeque<ObjectKey>,
    // Keys known to need processing (pending or re-added while in flight)
    dirty: HashSet<ObjectKey>,
    // Keys currently held by a worker
    processing: HashSet<ObjectKey>,
    shutdown: bool,
}

/// Work queue with per-key deduplication and in-flight exclusion.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue").finish_non_exhaustive()
    }
}

impl WorkQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a key. Duplicate adds of a pending key collapse into
    /// one delivery; adds of an in-flight key are deferred until the
    /// worker finishes.
    pub fn add(&self, key: ObjectKey) {
        let mut state = self.lock();
        if state.shutdown || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            // Re-delivered by done() once the current reconcile ends
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next key. Returns `None` once the queue is shut
    /// down and drained.
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutdown {
                    drop(state);
                    // Pass the wakeup on so every waiting worker exits
                    self.notify.notify_one();
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark a key's reconcile as finished. If the key was re-added
    /// while in flight, it goes back on the queue.
    pub fn done(&self, key: &ObjectKey) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Number of keys waiting for a worker.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// True when no keys are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and wake all waiting workers.
    pub fn shut_down(&self) {
        self.lock().shutdown = true;
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        assert_eq!(queue.get().await, Some(key("a")));
    }

    #[tokio::test]
    async fn test_pending_adds_deduplicate() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        queue.add(key("a"));
        queue.add(key("b"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().await, Some(key("a")));
        assert_eq!(queue.get().await, Some(key("b")));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_key_not_redelivered_until_done() {
        let queue = Arc::new(WorkQueue::new());
        queue.add(key("a"));
        let taken = queue.get().await.expect("first delivery");

        // Re-added while in flight: must not be handed out yet
        queue.add(key("a"));
        assert!(queue.is_empty());
        let blocked = timeout(Duration::from_millis(50), queue.get()).await;
        assert!(blocked.is_err(), "key must stay blocked until done()");

        queue.done(&taken);
        assert_eq!(queue.get().await, Some(key("a")));
    }

    #[tokio::test]
    async fn test_done_without_reads_is_terminal() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        let taken = queue.get().await.expect("delivery");
        queue.done(&taken);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_wakes_all_waiters() {
        let queue = Arc::new(WorkQueue::new());
        let mut handles = Vec::new();
        for _ in 0..3 {
            let q = Arc::clone(&queue);
            handles.push(tokio::spawn(async move { q.get().await }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shut_down();
        for handle in handles {
            let delivered = timeout(Duration::from_millis(200), handle)
                .await
                .expect("worker exits after shutdown")
                .expect("worker task");
            assert_eq!(delivered, None);
        }
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_ignored() {
        let queue = WorkQueue::new();
        queue.shut_down();
        queue.add(key("a"));
        assert_eq!(queue.get().await, None);
    }
}
