use crate::app_state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// Service banner with pointers to the other top-level endpoints.
pub async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    let service = state.service();
    Json(json!({
        "message": format!("Welcome to {}", service.name),
        "version": service.version,
        "health": "/health",
        "metrics": "/metrics",
        "api": "/api/v1",
    }))
}

/// Describes the data API.
pub async fn api_root_handler(State(state): State<AppState>) -> Json<Value> {
    let service = state.service();
    Json(json!({
        "message": format!("{} API", service.name),
        "version": service.version,
        "metrics": "/metrics",
        "database": service.storage,
    }))
}
