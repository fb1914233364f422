//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{DeveloperMachine, StateMachine};
use instance_store::InstanceStore;
use serde::Serialize;

use super::developers::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub saga_type: &'static str,
    pub ingress: &'static str,
    pub pending_timers: usize,
}

/// GET /health: reports whether the ingress listener is still draining.
pub async fn check<S: InstanceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let closed = state.ingress.is_closed();
    let status = if closed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(HealthResponse {
            status: if closed { "degraded" } else { "ok" },
            saga_type: DeveloperMachine::saga_type(),
            ingress: if closed { "closed" } else { "open" },
            pending_timers: state.scheduler.pending_count().await,
        }),
    )
}
