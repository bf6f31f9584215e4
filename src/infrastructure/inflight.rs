//! Process-local single-flight registry.
//!
//! Tracks idempotency keys whose operations are currently executing in this
//! process. The registry is consulted before the shared store so hot retries
//! coalesce without a Redis round-trip, and tests can await background
//! completions deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// Registry of keys with an execution in flight.
///
/// Cloning is cheap; clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InflightRegistry {
    inner: Arc<Mutex<HashMap<String, watch::Receiver<bool>>>>,
}

impl InflightRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to begin an execution for `key`.
    ///
    /// Returns `None` when the key already has an execution in flight. The
    /// returned guard marks the execution finished when dropped, waking any
    /// waiters.
    #[must_use]
    pub fn try_begin(&self, key: &str) -> Option<InflightGuard> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if guard.contains_key(key) {
            return None;
        }

        let (sender, receiver) = watch::channel(false);
        guard.insert(key.to_string(), receiver);
        Some(InflightGuard {
            key: key.to_string(),
            registry: Arc::clone(&self.inner),
            sender,
        })
    }

    /// Returns `true` if `key` has an execution in flight.
    #[must_use]
    pub fn is_running(&self, key: &str) -> bool {
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.contains_key(key)
    }

    /// Waits until the in-flight execution for `key` (if any) finishes.
    pub async fn wait(&self, key: &str) {
        let receiver = {
            let guard = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.get(key).cloned()
        };

        let Some(mut receiver) = receiver else {
            return;
        };

        while !*receiver.borrow() {
            // A closed channel means the guard was dropped without sending;
            // either way the execution is over.
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }

    /// Number of executions currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        let guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.len()
    }

    /// Returns `true` if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marks one in-flight execution; completion is signaled on drop.
#[derive(Debug)]
pub struct InflightGuard {
    key: String,
    registry: Arc<Mutex<HashMap<String, watch::Receiver<bool>>>>,
    sender: watch::Sender<bool>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut guard = self
            .registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.remove(&self.key);
        // Wake waiters regardless of receiver count.
        self.sender.send_replace(true);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_try_begin_is_exclusive() {
        let registry = InflightRegistry::new();

        let guard = registry.try_begin("key-1");
        assert!(guard.is_some());
        assert!(registry.is_running("key-1"));

        // Second begin for the same key is refused.
        assert!(registry.try_begin("key-1").is_none());

        // Different keys are independent.
        assert!(registry.try_begin("key-2").is_some());
    }

    #[rstest]
    fn test_drop_releases_key() {
        let registry = InflightRegistry::new();

        let guard = registry.try_begin("key-1").unwrap();
        drop(guard);

        assert!(!registry.is_running("key-1"));
        assert!(registry.try_begin("key-1").is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn test_wait_returns_immediately_when_idle() {
        let registry = InflightRegistry::new();
        registry.wait("unknown").await;
    }

    #[rstest]
    #[tokio::test]
    async fn test_wait_blocks_until_guard_drops() {
        let registry = InflightRegistry::new();
        let guard = registry.try_begin("key-1").unwrap();

        let waiter_registry = registry.clone();
        let waiter = tokio::spawn(async move {
            waiter_registry.wait("key-1").await;
        });

        // Give the waiter a chance to subscribe before completing.
        tokio::task::yield_now().await;
        drop(guard);

        waiter.await.unwrap();
        assert!(registry.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_concurrent_begin_single_winner() {
        let registry = InflightRegistry::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                // Return the guard so the winner stays in flight until all
                // attempts have been collected.
                tokio::spawn(async move { registry.try_begin("key-1") })
            })
            .collect();

        let mut guards = Vec::new();
        for handle in handles {
            if let Some(guard) = handle.await.unwrap() {
                guards.push(guard);
            }
        }
        assert_eq!(guards.len(), 1);
    }
}
