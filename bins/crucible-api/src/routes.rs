use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/execute", post(handlers::submit).options(preflight))
        .route("/status", get(handlers::status).options(preflight))
        .route("/languages", get(handlers::languages).options(preflight))
        .route("/health", get(handlers::health))
}

// CorsLayer answers real preflights; plain OPTIONS gets an empty 204.
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}
