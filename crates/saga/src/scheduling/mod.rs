//! Scheduling gateway trait and implementations for delayed events.

pub mod gateway;
pub mod timer;

pub use gateway::{InMemorySchedulingGateway, ScheduleRequest, SchedulingGateway};
pub use timer::TokioScheduler;
