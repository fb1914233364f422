//! HTTP host for the developer saga.
//!
//! Each endpoint originates one event for the developer addressed in the
//! path. `wake` and `get` wait for the runner's reply; `new-day` and `retire`
//! are queued on the ingress and answered with 202. The host also exposes
//! health and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{DeveloperEvent, DeveloperMachine};
use instance_store::InstanceStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{IngressReceiver, SagaRunner, TokioScheduler};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::developers::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: InstanceStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/developers/{id}", get(routes::developers::get::<S>))
        .route("/developers/{id}/wake", post(routes::developers::wake::<S>))
        .route(
            "/developers/{id}/new-day",
            post(routes::developers::new_day::<S>),
        )
        .route("/developers/{id}/retire", post(routes::developers::retire::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the runner, the tokio scheduler, and the ingress channel.
///
/// Returns the shared state and the ingress receiver the caller must hand
/// to [`SagaRunner::listen`].
pub fn create_default_state<S: InstanceStore + 'static>(
    store: S,
    config: &Config,
) -> (Arc<AppState<S>>, IngressReceiver<DeveloperEvent>) {
    let (ingress, receiver) = saga::channel(config.ingress_capacity);
    let scheduler = TokioScheduler::new(ingress.clone());

    let runner = SagaRunner::with_config(
        DeveloperMachine::new(config.developer()),
        store,
        scheduler.clone(),
        ingress.clone(),
        config.runner(),
    );

    let state = Arc::new(AppState {
        runner: Arc::new(runner),
        scheduler,
        ingress,
    });

    (state, receiver)
}
