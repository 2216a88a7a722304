//! Request interceptor that feeds the HTTP metric families.

use crate::app_state::AppState;
use crate::infrastructure::metrics::{RequestOutcome, NOT_FOUND_ENDPOINT};
use axum::{
    body::HttpBody,
    extract::{MatchedPath, Request, State},
    http::{header::CONTENT_LENGTH, HeaderMap},
    middleware::Next,
    response::Response,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{error, info};

/// Records request count, latency, sizes, and in-flight gauges.
///
/// The endpoint label is the matched route template so that path
/// parameters do not create new series; unmatched requests share the
/// `not_found` label. A panic in the handler is recorded and then resumed
/// unchanged. If the request future is dropped, the tracker's `Drop`
/// records it as cancelled.
pub async fn track_http_metrics(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // ---
    let path = request.uri().path().to_string();
    if state.is_excluded(&path) {
        return next.run(request).await;
    }

    let method = request.method().as_str().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| NOT_FOUND_ENDPOINT.to_string());
    let request_size = content_length(request.headers());

    let tracker = state
        .http_metrics()
        .start_request(&method, &endpoint, request_size);

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let response_size =
                content_length(response.headers()).or_else(|| response.body().size_hint().exact());

            let elapsed = tracker.finish(RequestOutcome::completed(status, response_size));
            info!(
                request_bytes = request_size,
                response_bytes = response_size,
                "{method} {path} - {status} - {:.3}s",
                elapsed.as_secs_f64()
            );
            response
        }
        Err(panic) => {
            let elapsed = tracker.finish(RequestOutcome::failed("panic"));
            error!(
                "{method} {path} - handler panicked - {:.3}s",
                elapsed.as_secs_f64()
            );
            std::panic::resume_unwind(panic)
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
