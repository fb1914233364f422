use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CorrelationId, Version};

/// The persisted form of one saga instance.
///
/// The store treats `state` as opaque JSON so any state machine can be
/// stored without the backend knowing its types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// The correlation key of the instance.
    pub id: CorrelationId,

    /// The kind of saga (e.g., "Developer").
    pub saga_type: String,

    /// The version stored with this record.
    pub version: Version,

    /// The serialized instance.
    pub state: serde_json::Value,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// Creates a record for the given serialized state.
    ///
    /// The version is assigned by the store on write.
    pub fn new(id: CorrelationId, saga_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            id,
            saga_type: saga_type.into(),
            version: Version::initial(),
            state,
            updated_at: Utc::now(),
        }
    }

    /// Creates a record from any serializable state.
    pub fn from_state<T: Serialize>(
        id: CorrelationId,
        saga_type: impl Into<String>,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(id, saga_type, serde_json::to_value(state)?))
    }

    /// Deserializes the stored state.
    pub fn to_state<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
    }

    #[test]
    fn test_state_roundtrip() {
        let id = CorrelationId::new();
        let record = InstanceRecord::from_state(id, "Counter", &Counter { count: 3 }).unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.saga_type, "Counter");
        assert!(record.version.is_initial());
        assert_eq!(record.to_state::<Counter>().unwrap(), Counter { count: 3 });
    }
}
