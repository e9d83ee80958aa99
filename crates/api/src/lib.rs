//! HTTP API server with observability for the loan lifecycle service.
//!
//! Provides REST endpoints to propose, approve, fund and disburse loans,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch};
use lending::{LoanService, Notifier, ServiceConfig, TracingNotifier};
use loan_store::LoanRepository;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::loans::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R: LoanRepository + 'static>(
    state: Arc<AppState<R>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/loans",
            get(routes::loans::list::<R>).post(routes::loans::create::<R>),
        )
        .route("/loans/{id}", get(routes::loans::get::<R>))
        .route("/loans/{id}/approve", patch(routes::loans::approve::<R>))
        .route("/loans/{id}/invest", patch(routes::loans::invest::<R>))
        .route("/loans/{id}/disburse", patch(routes::loans::disburse::<R>))
        .route(
            "/investors/{id}/loans",
            get(routes::loans::by_investor::<R>),
        )
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

/// Creates the application state around a repository and notifier.
///
/// Must be called within a Tokio runtime.
pub fn create_state<R: LoanRepository + 'static>(
    repository: R,
    notifier: Arc<dyn Notifier>,
    config: ServiceConfig,
) -> Arc<AppState<R>> {
    Arc::new(AppState {
        service: LoanService::new(repository, notifier, config),
    })
}

/// Creates the application state with a log-only notifier and default settings.
pub fn create_default_state<R: LoanRepository + 'static>(repository: R) -> Arc<AppState<R>> {
    create_state(
        repository,
        Arc::new(TracingNotifier),
        ServiceConfig::default(),
    )
}
