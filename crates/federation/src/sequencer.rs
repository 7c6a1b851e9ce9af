//! Per-object serialisation of fan-outs within one process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one lock per object IRI so a later activity about an object
/// (an Update) cannot overtake an earlier one (its Create) on the way to an
/// inbox.
#[derive(Clone, Default)]
pub struct ObjectSequencer {
    locks: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

/// Held while a fan-out for the object is in flight. Clones share the lock.
#[derive(Clone)]
pub struct SequenceGuard {
    _guard: Arc<OwnedMutexGuard<()>>,
}

impl ObjectSequencer {
    /// Create an empty sequencer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for earlier fan-outs of `object_id` to finish, then take the lock.
    pub async fn acquire(&self, object_id: &str) -> SequenceGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, weak| weak.strong_count() > 0);
            if let Some(lock) = locks.get(object_id).and_then(Weak::upgrade) {
                lock
            } else {
                let lock = Arc::new(AsyncMutex::new(()));
                locks.insert(object_id.to_string(), Arc::downgrade(&lock));
                lock
            }
        };

        SequenceGuard {
            _guard: Arc::new(lock.lock_owned().await),
        }
    }

    /// Number of objects with a live lock.
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_object_waits_for_release() {
        let sequencer = ObjectSequencer::new();
        let first = sequencer.acquire("https://local.example/notes/1").await;

        let waiter = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                let _second = sequencer.acquire("https://local.example/notes/1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_clones_keep_lock_until_last_drop() {
        let sequencer = ObjectSequencer::new();
        let guard = sequencer.acquire("a").await;
        let clone = guard.clone();
        drop(guard);

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), sequencer.acquire("a")).await;
        assert!(blocked.is_err());

        drop(clone);
        let _again = sequencer.acquire("a").await;
    }

    #[tokio::test]
    async fn test_distinct_objects_do_not_block_and_entries_are_pruned() {
        let sequencer = ObjectSequencer::new();
        let a = sequencer.acquire("a").await;
        let b = sequencer.acquire("b").await;
        assert_eq!(sequencer.active(), 2);

        drop(a);
        drop(b);
        assert_eq!(sequencer.active(), 0);
    }
}
