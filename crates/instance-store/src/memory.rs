use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    CorrelationId, InstanceRecord, InstanceStoreError, Result, Version, store::InstanceStore,
};

/// In-memory instance store implementation for testing and single-process hosts.
///
/// This implementation keeps every record in memory and provides
/// the same compare-and-swap semantics as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryInstanceStore {
    records: Arc<RwLock<HashMap<CorrelationId, InstanceRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryInstanceStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored instances.
    pub async fn instance_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Makes every following call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(InstanceStoreError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn load(&self, id: CorrelationId) -> Result<Option<InstanceRecord>> {
        self.check_available()?;
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected: Version,
        mut record: InstanceRecord,
    ) -> Result<Version> {
        self.check_available()?;
        let id = record.id;
        let mut records = self.records.write().await;

        let actual = records
            .get(&id)
            .map(|stored| stored.version)
            .unwrap_or_default();
        if actual != expected {
            metrics::counter!("instance_store_conflicts_total").increment(1);
            return Err(InstanceStoreError::VersionConflict {
                id,
                expected,
                actual,
            });
        }

        let new_version = expected.next();
        record.version = new_version;
        record.updated_at = Utc::now();
        records.insert(id, record);

        Ok(new_version)
    }

    async fn remove(&self, id: CorrelationId, expected: Version) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.write().await;

        match records.get(&id) {
            None => Err(InstanceStoreError::InstanceNotFound(id)),
            Some(stored) if stored.version != expected => {
                Err(InstanceStoreError::VersionConflict {
                    id,
                    expected,
                    actual: stored.version,
                })
            }
            Some(_) => {
                records.remove(&id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InstanceStoreExt;

    fn record(id: CorrelationId, count: u32) -> InstanceRecord {
        InstanceRecord::new(id, "Counter", serde_json::json!({ "count": count }))
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();

        assert!(store.load(id).await.unwrap().is_none());

        let version = store
            .compare_and_swap(Version::initial(), record(id, 1))
            .await
            .unwrap();
        assert_eq!(version, Version::first());

        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.version, Version::first());
        assert_eq!(loaded.state["count"], 1);
        assert_eq!(store.instance_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_increments_version() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();

        store
            .compare_and_swap(Version::initial(), record(id, 1))
            .await
            .unwrap();
        let version = store
            .compare_and_swap(Version::first(), record(id, 2))
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(store.current_version(id).await.unwrap(), Version::new(2));
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();

        store
            .compare_and_swap(Version::initial(), record(id, 1))
            .await
            .unwrap();
        store
            .compare_and_swap(Version::first(), record(id, 2))
            .await
            .unwrap();

        let result = store.compare_and_swap(Version::first(), record(id, 3)).await;
        match result {
            Err(InstanceStoreError::VersionConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, Version::first());
                assert_eq!(actual, Version::new(2));
            }
            other => panic!("Expected VersionConflict, got {other:?}"),
        }

        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.state["count"], 2);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();

        store
            .compare_and_swap(Version::initial(), record(id, 1))
            .await
            .unwrap();
        let err = store
            .compare_and_swap(Version::initial(), record(id, 1))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_concurrent_creates_admit_exactly_one() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();

        let attempts = (0..8).map(|n| {
            let store = store.clone();
            async move {
                store
                    .compare_and_swap(Version::initial(), record(id, n))
                    .await
            }
        });
        let results = futures_util::future::join_all(attempts).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.instance_count().await, 1);
    }

    #[tokio::test]
    async fn test_remove_is_version_checked() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();

        store
            .compare_and_swap(Version::initial(), record(id, 1))
            .await
            .unwrap();

        assert!(store.remove(id, Version::new(5)).await.unwrap_err().is_conflict());
        store.remove(id, Version::first()).await.unwrap();
        assert!(!store.exists(id).await.unwrap());

        let err = store.remove(id, Version::first()).await.unwrap_err();
        assert!(matches!(err, InstanceStoreError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.load(id).await,
            Err(InstanceStoreError::Unavailable(_))
        ));

        store.set_unavailable(false);
        assert!(store.load(id).await.unwrap().is_none());
    }
}
