//! Saga instance record.

use std::collections::BTreeMap;

use common::{CorrelationId, ScheduleToken};
use instance_store::Version;
use serde::{Deserialize, Serialize};

/// One saga instance, addressed by its correlation key.
///
/// `state` changes only through a state machine decision. `scheduled` maps a
/// timer slot name to the single live token armed for it. `version` is owned
/// by the instance store and is not part of the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance<S, D> {
    pub id: CorrelationId,
    pub state: S,
    pub data: D,
    #[serde(skip)]
    pub version: Version,
    #[serde(default)]
    pub scheduled: BTreeMap<String, ScheduleToken>,
}

impl<S, D: Default> Instance<S, D> {
    /// Creates an unpersisted instance with default data.
    pub fn new(id: CorrelationId, state: S) -> Self {
        Self {
            id,
            state,
            data: D::default(),
            version: Version::initial(),
            scheduled: BTreeMap::new(),
        }
    }
}

impl<S, D> Instance<S, D> {
    /// Returns true if the instance has never been written.
    pub fn is_new(&self) -> bool {
        self.version.is_initial()
    }

    /// Returns the live token for a slot, if any.
    pub fn token(&self, slot: &str) -> Option<ScheduleToken> {
        self.scheduled.get(slot).copied()
    }

    /// Arms a slot with a new token, returning the token it replaces.
    pub fn arm(&mut self, slot: impl Into<String>, token: ScheduleToken) -> Option<ScheduleToken> {
        self.scheduled.insert(slot.into(), token)
    }

    /// Clears a slot, returning the token that was armed.
    pub fn disarm(&mut self, slot: &str) -> Option<ScheduleToken> {
        self.scheduled.remove(slot)
    }
}
