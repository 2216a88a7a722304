use crate::app_state::AppState;
use crate::infrastructure::metrics::CONTENT_TYPE;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

/// Handler for the `/metrics` endpoint.
///
/// Returns every registered family in Prometheus text format for scraping.
/// A render failure yields `500` with no partial exposition.
pub async fn metrics_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    // ---
    match app_state.registry().render() {
        Ok(text) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], text).into_response(),
        Err(err) => {
            tracing::error!("Error generating metrics: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("# Error generating metrics: {err}\n"),
            )
                .into_response()
        }
    }
}

/// Handler for `/metrics/summary`: a JSON view for humans and debugging.
pub async fn metrics_summary_handler(State(app_state): State<AppState>) -> Json<Value> {
    // ---
    let resources = app_state.resources();
    let service = app_state.service();

    Json(json!({
        "active_requests": app_state.http_metrics().active_requests(),
        "system_metrics": resources,
        "metric_families": app_state.registry().family_names(),
        "metrics_endpoint": "/metrics",
        "collection_interval": service.collection_interval.as_secs(),
    }))
}
