//! HTTP surface over the CMA engine

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::cma::report::CmaService;

pub mod error;
pub mod handlers;
pub mod request;

pub use error::ApiError;
pub use request::{CmaRequest, FieldViolation};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CmaService>,
}

pub fn cma_routes() -> Router<AppState> {
    Router::new()
        .route("/api/cma", post(handlers::create_report))
        .route(
            "/api/cma/:id",
            get(handlers::get_report).delete(handlers::delete_report),
        )
        .route("/api/cma/:id/comparables", get(handlers::get_comparables))
        .route("/api/cma/:id/insights", get(handlers::get_insights))
        .route("/api/cma/:id/adjustments", get(handlers::get_adjustments))
        .route("/api/cma/:id/complete", get(handlers::get_complete_report))
}

/// Full application router with state applied
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        .merge(cma_routes())
        .with_state(state)
}
