//! Route definitions

pub mod billing;

use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::json;

use crate::firewall;
use crate::state::AppState;

/// Build the application router. The firewall middleware wraps every
/// route; per-route behaviour comes from the static classification in
/// [`firewall::RouteClass`].
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/billing/webhook", post(billing::webhook))
        .route("/v1/billing/entitlement", get(billing::entitlement))
        .route("/v1/tenant", get(billing::tenant_profile))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            firewall::firewall,
        ))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}
