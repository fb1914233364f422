//! State machine core for the saga engine.
//!
//! This crate provides the pure decision layer:
//! - `StateMachine` and `MachineEvent` traits describing a correlated saga
//! - `Instance`, the per-key record of state, data, and armed timer slots
//! - `Decision`, `Transition`, and `Effect`, the output of one decision
//! - `TransitionTable`, an explicit rule table evaluated by a small interpreter
//! - the developer saga built on top of it

pub mod decision;
pub mod developer;
pub mod instance;
pub mod machine;
pub mod table;

pub use decision::{Decision, Effect, Transition};
pub use developer::{
    AUTO_TIRED, DeveloperConfig, DeveloperData, DeveloperEvent, DeveloperMachine,
    DeveloperSnapshot, DeveloperState,
};
pub use instance::Instance;
pub use machine::{EventKind, InstanceOf, MachineEvent, StateMachine};
pub use table::{Rule, StateFilter, TransitionTable};
