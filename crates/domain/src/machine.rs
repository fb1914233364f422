//! Core state machine and event traits.

use std::fmt::{Debug, Display};

use common::CorrelationId;
use serde::{Serialize, de::DeserializeOwned};

use crate::decision::Decision;
use crate::instance::Instance;

/// How an event relates to the lifecycle of its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Creates the instance when none exists, then mutates it.
    Creating,

    /// Mutates an existing instance; fails against a missing one.
    Mutating,

    /// Only reads; never creates, never mutates, and may answer "unknown".
    ReadOnly,
}

impl EventKind {
    /// Returns true if this kind may create a missing instance.
    pub fn creates(&self) -> bool {
        matches!(self, EventKind::Creating)
    }

    /// Returns true if this kind may change instance state.
    pub fn mutates(&self) -> bool {
        !matches!(self, EventKind::ReadOnly)
    }
}

/// Trait for events delivered to a state machine.
pub trait MachineEvent:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Returns the event type name.
    ///
    /// Transition rules match on this name.
    fn event_type(&self) -> &'static str;

    /// Returns how the event relates to the instance lifecycle.
    fn kind(&self) -> EventKind;
}

/// Instance type of a state machine.
pub type InstanceOf<M> = Instance<<M as StateMachine>::State, <M as StateMachine>::Data>;

/// Trait for correlated saga state machines.
///
/// A state machine is pure decision logic: given an instance and an event it
/// returns the next state, the mutated data, the side effects to perform, and
/// whether the caller gets a reply. It never performs I/O itself.
pub trait StateMachine: Send + Sync + Sized + 'static {
    /// Finite set of states.
    type State: Copy
        + Eq
        + Debug
        + Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Per-instance data carried alongside the state.
    type Data: Clone + Default + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Events this machine reacts to.
    type Event: MachineEvent;

    /// What callers receive when a transition replies.
    type Snapshot: Clone + Debug + Serialize + Send + Sync + 'static;

    /// Returns the saga type name used for storage.
    fn saga_type() -> &'static str;

    /// Returns the state of a freshly created instance.
    fn initial_state() -> Self::State;

    /// Returns true if the state is terminal (absorbing).
    fn is_terminal(state: &Self::State) -> bool;

    /// Decides how the instance reacts to the event.
    ///
    /// Must be pure and deterministic.
    fn decide(&self, instance: &InstanceOf<Self>, event: &Self::Event) -> Decision<Self>;

    /// Builds the reply payload for an instance.
    fn snapshot(instance: &InstanceOf<Self>) -> Self::Snapshot;

    /// Synthesizes a fresh, unpersisted instance at the initial state.
    fn create(id: CorrelationId) -> InstanceOf<Self> {
        Instance::new(id, Self::initial_state())
    }
}
