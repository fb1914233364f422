//! HTTP route handlers.

pub mod developers;
pub mod health;
pub mod metrics;
