//! Saga runtime for correlated state machines.
//!
//! This crate turns a pure [`domain::StateMachine`] into a running service:
//!
//! 1. the [`Correlator`] maps each inbound event to its instance,
//! 2. the [`SagaRunner`] serializes mutations per key, evaluates the
//!    machine, and persists the result with a compare-and-swap,
//! 3. timer and publish effects go out through a [`SchedulingGateway`] and
//!    an [`EventPublisher`] only after the write succeeded.
//!
//! Fired timers and derived events come back in through the same ingress
//! channel as external messages.

pub mod config;
pub mod correlator;
pub mod error;
pub mod ingress;
pub mod locks;
pub mod runner;
pub mod scheduling;

pub use config::{ParsePolicyError, RunnerConfig, UnhandledPolicy};
pub use correlator::{Correlator, Resolution};
pub use error::{Result, SagaError};
pub use ingress::{
    EventPublisher, InMemoryEventPublisher, Inbound, IngressReceiver, IngressSender, TimerStamp,
    channel,
};
pub use locks::{KeyGuard, KeyedLocks};
pub use runner::{Reply, SagaRunner};
pub use scheduling::{
    InMemorySchedulingGateway, ScheduleRequest, SchedulingGateway, TokioScheduler,
};
