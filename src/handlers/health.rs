use crate::app_state::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

/// Light check confirming the web server is running.
///
/// # Responses
/// - `200 OK` with `{"status": "healthy", ...}`
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let service = state.service();
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": service.name,
        "version": service.version,
        "database": service.storage,
    }))
}

/// Health check including the latest resource sample and database status.
///
/// Resource figures come from the system sampler's last successful reading
/// rather than a fresh probe, so this endpoint never blocks on the OS.
pub async fn detailed_health_check(State(state): State<AppState>) -> Json<Value> {
    // ---
    let database_status = match state.repository().health_check().await {
        Ok(true) => "healthy".to_string(),
        Ok(false) => "unhealthy".to_string(),
        Err(err) => format!("error: {err}"),
    };
    let resources = state.resources();
    let service = state.service();

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": service.name,
        "version": service.version,
        "database": {
            "type": service.storage,
            "status": database_status,
        },
        "sampled_at": resources.sampled_at,
        "system": resources.system,
        "process": resources.process,
        "pid": std::process::id(),
    }))
}

/// Readiness probe: ready once the database answers.
pub async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    // ---
    match state.repository().health_check().await {
        Ok(true) => Json(json!({ "status": "ready" })),
        Ok(false) => Json(json!({
            "status": "not ready",
            "reason": "database not healthy",
        })),
        Err(err) => Json(json!({
            "status": "not ready",
            "reason": format!("database check failed: {err}"),
        })),
    }
}

/// Liveness probe.
pub async fn liveness_check() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

/// Database status, always `200` with the outcome in the body.
pub async fn database_status(State(state): State<AppState>) -> Json<Value> {
    // ---
    match state.repository().health_check().await {
        Ok(true) => Json(json!({ "status": "healthy" })),
        Ok(false) => Json(json!({ "status": "unhealthy" })),
        Err(err) => {
            tracing::warn!("Database health check failed: {err:#}");
            Json(json!({ "status": "error", "reason": err.to_string() }))
        }
    }
}
