//! Per-key serialization of instance mutations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use common::CorrelationId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A table of async mutexes, one per correlation key in use.
///
/// Entries exist only while someone holds or waits for the key, so the
/// table does not grow with the number of instances ever seen.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Arc<Mutex<HashMap<CorrelationId, Arc<AsyncMutex<()>>>>>,
}

/// Exclusive access to one key. Released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    key: CorrelationId,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<Mutex<HashMap<CorrelationId, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the key is free and takes it.
    ///
    /// A waiter dropped before it gets the key releases its table entry like
    /// a holder would.
    pub async fn acquire(&self, key: CorrelationId) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };

        let mut entry = KeyGuard {
            key,
            guard: None,
            slots: Arc::clone(&self.slots),
        };
        entry.guard = Some(slot.lock_owned().await);
        entry
    }

    /// Returns the number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl KeyGuard {
    /// Returns the key this guard protects.
    pub fn key(&self) -> CorrelationId {
        self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();

        // Our Arc is gone, either with the guard or with the abandoned wait;
        // one left is the table's own.
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let key = CorrelationId::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _guard = locks.acquire(key).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let a = locks.acquire(CorrelationId::new()).await;
        let b = locks.acquire(CorrelationId::new()).await;

        assert_ne!(a.key(), b.key());
        assert_eq!(locks.active_keys(), 2);

        drop(a);
        drop(b);
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_waiter_exists() {
        let locks = Arc::new(KeyedLocks::new());
        let key = CorrelationId::new();
        let first = locks.acquire(key).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(key).await;
            })
        };
        tokio::task::yield_now().await;

        drop(first);
        assert_eq!(locks.active_keys(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_entry() {
        let locks = Arc::new(KeyedLocks::new());
        let key = CorrelationId::new();
        let first = locks.acquire(key).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(key).await;
            })
        };
        tokio::task::yield_now().await;

        // Released while the waiter is still queued, then the waiter goes away
        // before it ever runs again.
        drop(first);
        assert_eq!(locks.active_keys(), 1);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        assert_eq!(locks.active_keys(), 0);
    }
}
