//! Output of one state machine decision.

use std::time::Duration;

use crate::machine::StateMachine;

/// A side effect requested by a transition.
///
/// Effects are executed by the runner only after the new instance state has
/// been persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect<E> {
    /// Arm `slot` to deliver `event` after `delay`, replacing any live timer
    /// in the same slot.
    Schedule {
        slot: &'static str,
        delay: Duration,
        event: E,
    },

    /// Cancel the live timer in `slot`, if any.
    Unschedule { slot: &'static str },

    /// Publish a derived event back into the ingress for the same key.
    Publish(E),
}

impl<E> Effect<E> {
    /// Returns the timer slot this effect touches, if any.
    pub fn slot(&self) -> Option<&'static str> {
        match self {
            Effect::Schedule { slot, .. } | Effect::Unschedule { slot } => Some(slot),
            Effect::Publish(_) => None,
        }
    }
}

/// The computed next step of an instance.
#[derive(Debug)]
pub struct Transition<M: StateMachine> {
    /// The state after the transition (may equal the current one).
    pub state: M::State,

    /// The data after the transition's action ran.
    pub data: M::Data,

    /// Side effects to perform once the write succeeded.
    pub effects: Vec<Effect<M::Event>>,

    /// Whether the original caller receives a snapshot.
    pub reply: bool,

    /// Short description of what happened, for the logs.
    pub note: &'static str,
}

/// Result of evaluating an event against an instance.
#[derive(Debug)]
pub enum Decision<M: StateMachine> {
    /// A rule matched.
    Apply(Transition<M>),

    /// No rule exists for this event in the current state.
    Unhandled,
}

impl<M: StateMachine> Decision<M> {
    /// Returns the transition, if a rule matched.
    pub fn transition(self) -> Option<Transition<M>> {
        match self {
            Decision::Apply(transition) => Some(transition),
            Decision::Unhandled => None,
        }
    }

    /// Returns true if no rule matched.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, Decision::Unhandled)
    }
}
