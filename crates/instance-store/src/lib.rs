//! Durable mapping from correlation key to the latest saga instance record.
//!
//! Every write is a compare-and-swap against the stored [`Version`]; a
//! writer that observed a stale version gets [`InstanceStoreError::VersionConflict`]
//! and must re-read before trying again.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;
pub mod version;

pub use common::CorrelationId;
pub use error::{InstanceStoreError, Result};
pub use memory::InMemoryInstanceStore;
pub use postgres::PostgresInstanceStore;
pub use record::InstanceRecord;
pub use store::{InstanceStore, InstanceStoreExt};
pub use version::Version;
