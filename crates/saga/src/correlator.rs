//! Correlation of inbound events to saga instances.

use std::marker::PhantomData;

use common::CorrelationId;
use domain::{InstanceOf, MachineEvent, StateMachine};
use instance_store::InstanceStore;

use crate::error::SagaError;

/// Outcome of resolving a correlation key.
#[derive(Debug)]
pub enum Resolution<M: StateMachine> {
    /// The stored instance.
    Existing(InstanceOf<M>),

    /// A fresh, unpersisted instance at the initial state.
    Created(InstanceOf<M>),

    /// No instance, and the event may not create one.
    Missing,
}

impl<M: StateMachine> Resolution<M> {
    /// Returns the instance, stored or freshly created.
    pub fn into_instance(self) -> Option<InstanceOf<M>> {
        match self {
            Resolution::Existing(instance) | Resolution::Created(instance) => Some(instance),
            Resolution::Missing => None,
        }
    }
}

/// Maps `(key, event)` to the instance the event is addressed to.
pub struct Correlator<M, S> {
    store: S,
    _machine: PhantomData<fn() -> M>,
}

impl<M, S> Correlator<M, S>
where
    M: StateMachine,
    S: InstanceStore,
{
    /// Creates a correlator reading from the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _machine: PhantomData,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolves the instance for an event.
    ///
    /// A creating event against a missing key yields a fresh instance that is
    /// not persisted here; the runner's first write creates it. A read-only
    /// event yields `Missing`. Any other event against a missing key fails
    /// with `UnknownInstance`.
    pub async fn resolve(
        &self,
        key: CorrelationId,
        event: &M::Event,
    ) -> Result<Resolution<M>, SagaError> {
        match self.store.load(key).await? {
            Some(record) => {
                let mut instance: InstanceOf<M> = record.to_state()?;
                instance.version = record.version;
                Ok(Resolution::Existing(instance))
            }
            None if event.kind().creates() => Ok(Resolution::Created(M::create(key))),
            None if event.kind().mutates() => Err(SagaError::UnknownInstance(key)),
            None => Ok(Resolution::Missing),
        }
    }
}
