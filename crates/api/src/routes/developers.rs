//! Developer endpoints: each request originates one saga event.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::CorrelationId;
use domain::{DeveloperEvent, DeveloperMachine, DeveloperSnapshot, MachineEvent};
use instance_store::InstanceStore;
use saga::{Inbound, IngressSender, Reply, SagaRunner, TokioScheduler};
use serde::Serialize;

use crate::error::ApiError;

/// The runner the host drives.
pub type DeveloperRunner<S> = SagaRunner<
    DeveloperMachine,
    S,
    TokioScheduler<DeveloperEvent>,
    IngressSender<DeveloperEvent>,
>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: InstanceStore> {
    pub runner: Arc<DeveloperRunner<S>>,
    pub scheduler: TokioScheduler<DeveloperEvent>,
    pub ingress: IngressSender<DeveloperEvent>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct DeveloperResponse {
    pub id: String,
    pub state: String,
    pub sleep_count: u32,
    pub version: i64,
}

impl From<DeveloperSnapshot> for DeveloperResponse {
    fn from(snapshot: DeveloperSnapshot) -> Self {
        Self {
            id: snapshot.id.to_string(),
            state: snapshot.state.to_string(),
            sleep_count: snapshot.sleep_count,
            version: snapshot.version.as_i64(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: String,
    pub event: &'static str,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UnknownResponse {
    pub unknown: String,
}

// -- Handlers --

/// POST /developers/{id}/wake: wakes the developer and returns its snapshot.
pub async fn wake<S: InstanceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let key = parse_correlation_id(&id)?;
    let reply = state.runner.dispatch(key, DeveloperEvent::Wake).await?;
    Ok(reply_response(key, &DeveloperEvent::Wake, reply))
}

/// GET /developers/{id}: returns the developer's snapshot, or 404 if unknown.
pub async fn get<S: InstanceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let key = parse_correlation_id(&id)?;
    let reply = state.runner.dispatch(key, DeveloperEvent::Query).await?;
    Ok(reply_response(key, &DeveloperEvent::Query, reply))
}

/// POST /developers/{id}/new-day: queues a new day.
pub async fn new_day<S: InstanceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    enqueue(&state, &id, DeveloperEvent::NewDay).await
}

/// POST /developers/{id}/retire: queues a retirement.
pub async fn retire<S: InstanceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    enqueue(&state, &id, DeveloperEvent::Retire).await
}

async fn enqueue<S: InstanceStore>(
    state: &AppState<S>,
    id: &str,
    event: DeveloperEvent,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    let key = parse_correlation_id(id)?;
    let event_type = event.event_type();

    state.ingress.send(Inbound::new(key, event)).await?;
    metrics::counter!("api_events_queued_total", "event" => event_type).increment(1);
    tracing::debug!(%key, event = event_type, "event queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EventResponse {
            id: key.to_string(),
            event: event_type,
            outcome: "queued",
        }),
    ))
}

fn reply_response(
    key: CorrelationId,
    event: &DeveloperEvent,
    reply: Reply<DeveloperSnapshot>,
) -> Response {
    let acknowledged = |outcome: &'static str| {
        (
            StatusCode::ACCEPTED,
            Json(EventResponse {
                id: key.to_string(),
                event: event.event_type(),
                outcome,
            }),
        )
            .into_response()
    };

    match reply {
        Reply::Snapshot(snapshot) => Json(DeveloperResponse::from(snapshot)).into_response(),
        Reply::Unknown(id) => (
            StatusCode::NOT_FOUND,
            Json(UnknownResponse {
                unknown: id.to_string(),
            }),
        )
            .into_response(),
        Reply::Accepted => acknowledged("accepted"),
        Reply::Ignored => acknowledged("ignored"),
    }
}

fn parse_correlation_id(id: &str) -> Result<CorrelationId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(CorrelationId::from_uuid(uuid))
}
