use async_trait::async_trait;

use crate::{CorrelationId, InstanceRecord, Result, Version};

/// Core trait for instance store implementations.
///
/// The store is the only shared mutable resource of the engine. All
/// implementations must be thread-safe (Send + Sync) and must apply every
/// write as a compare-and-swap on the stored version.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Loads the record for a correlation key.
    ///
    /// Returns None if no instance exists for the key.
    async fn load(&self, id: CorrelationId) -> Result<Option<InstanceRecord>>;

    /// Writes a record if the stored version equals `expected`.
    ///
    /// `Version::initial()` means "no record may exist yet". On success the
    /// stored version becomes `expected.next()`, which is returned. On a
    /// mismatch the write is rejected with `VersionConflict`.
    async fn compare_and_swap(&self, expected: Version, record: InstanceRecord)
    -> Result<Version>;

    /// Deletes a record if the stored version equals `expected`.
    ///
    /// Used to garbage-collect retired instances.
    async fn remove(&self, id: CorrelationId, expected: Version) -> Result<()>;
}

/// Extension trait providing convenience methods for instance stores.
#[async_trait]
pub trait InstanceStoreExt: InstanceStore {
    /// Checks if an instance exists for the key.
    async fn exists(&self, id: CorrelationId) -> Result<bool> {
        Ok(self.load(id).await?.is_some())
    }

    /// Returns the stored version, or `Version::initial()` when absent.
    async fn current_version(&self, id: CorrelationId) -> Result<Version> {
        Ok(self
            .load(id)
            .await?
            .map(|record| record.version)
            .unwrap_or_default())
    }
}

// Blanket implementation for all InstanceStore implementations
impl<T: InstanceStore + ?Sized> InstanceStoreExt for T {}
