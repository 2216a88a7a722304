//! HTTP request instruments and the per-request tracking guard.

use crate::domain::{MetricDescriptor, MetricsError};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::RegistryPtr;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const HTTP_REQUEST_SIZE_BYTES: &str = "http_request_size_bytes";
pub const HTTP_RESPONSE_SIZE_BYTES: &str = "http_response_size_bytes";
pub const HTTP_REQUESTS_IN_PROGRESS: &str = "http_requests_in_progress";
pub const HTTP_REQUESTS_EXCEPTIONS_TOTAL: &str = "http_requests_exceptions_total";
pub const HTTP_REQUEST_PROCESSING_SECONDS: &str = "http_request_processing_seconds";

/// Endpoint label used for requests that matched no route.
pub const NOT_FOUND_ENDPOINT: &str = "not_found";

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];
const PROCESSING_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
const SIZE_BUCKETS: &[f64] = &[
    64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0,
];

/// How a tracked request ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub status: u16,
    pub response_size: Option<u64>,
    /// Set when the handler did not return normally (`panic`, `cancelled`).
    pub exception: Option<&'static str>,
}

impl RequestOutcome {
    /// The handler returned a response.
    pub fn completed(status: u16, response_size: Option<u64>) -> Self {
        Self {
            status,
            response_size,
            exception: None,
        }
    }

    /// The handler failed without producing a response.
    pub fn failed(exception: &'static str) -> Self {
        Self {
            status: 500,
            response_size: None,
            exception: Some(exception),
        }
    }
}

/// HTTP request instruments registered in a [`MetricsRegistry`](super::MetricsRegistry).
pub struct HttpMetrics {
    registry: RegistryPtr,
    /// Sum of all in-progress series, for the summary endpoint.
    active: AtomicI64,
}

impl HttpMetrics {
    /// Register every HTTP family and return the recorder.
    pub fn register(registry: RegistryPtr) -> Result<Arc<Self>, MetricsError> {
        // ---
        let endpoint = &["method", "endpoint"];

        registry.register(MetricDescriptor::counter(
            HTTP_REQUESTS_TOTAL,
            "Total number of HTTP requests",
            &["method", "endpoint", "status_code"],
        )?)?;
        registry.register(MetricDescriptor::histogram(
            HTTP_REQUEST_DURATION_SECONDS,
            "HTTP request duration in seconds",
            endpoint,
            DURATION_BUCKETS,
        )?)?;
        registry.register(MetricDescriptor::histogram(
            HTTP_REQUEST_SIZE_BYTES,
            "HTTP request size in bytes",
            endpoint,
            SIZE_BUCKETS,
        )?)?;
        registry.register(MetricDescriptor::histogram(
            HTTP_RESPONSE_SIZE_BYTES,
            "HTTP response size in bytes",
            endpoint,
            SIZE_BUCKETS,
        )?)?;
        registry.register(MetricDescriptor::gauge(
            HTTP_REQUESTS_IN_PROGRESS,
            "Number of HTTP requests currently being processed",
            endpoint,
        )?)?;
        registry.register(MetricDescriptor::counter(
            HTTP_REQUESTS_EXCEPTIONS_TOTAL,
            "Total number of HTTP requests that resulted in exceptions",
            &["method", "endpoint", "exception_type"],
        )?)?;
        registry.register(MetricDescriptor::histogram(
            HTTP_REQUEST_PROCESSING_SECONDS,
            "Time spent processing HTTP requests (excluding network time)",
            endpoint,
            PROCESSING_BUCKETS,
        )?)?;

        Ok(Arc::new(Self {
            registry,
            active: AtomicI64::new(0),
        }))
    }

    /// Begin tracking one request.
    ///
    /// The returned guard records the exit side exactly once: on
    /// [`RequestTracker::finish`], or on drop if the request is cancelled.
    pub fn start_request(
        self: &Arc<Self>,
        method: &str,
        endpoint: &str,
        request_size: Option<u64>,
    ) -> RequestTracker {
        // ---
        let labels = [("method", method), ("endpoint", endpoint)];

        self.active.fetch_add(1, Ordering::Relaxed);
        log_failure(
            "in-progress increment",
            self.registry.gauge_add(HTTP_REQUESTS_IN_PROGRESS, &labels, 1.0),
        );

        if let Some(size) = request_size {
            log_failure(
                "request size",
                self.registry
                    .histogram_observe(HTTP_REQUEST_SIZE_BYTES, &labels, size as f64),
            );
        }

        RequestTracker {
            metrics: Arc::clone(self),
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            started_at: Instant::now(),
            outcome: None,
        }
    }

    /// Requests currently in flight across all endpoints.
    pub fn active_requests(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }

    fn complete(&self, method: &str, endpoint: &str, elapsed: Duration, outcome: &RequestOutcome) {
        // ---
        let labels = [("method", method), ("endpoint", endpoint)];
        let status = outcome.status.to_string();
        let seconds = elapsed.as_secs_f64();

        log_failure(
            "in-progress decrement",
            self.registry.gauge_add(HTTP_REQUESTS_IN_PROGRESS, &labels, -1.0),
        );
        self.active.fetch_sub(1, Ordering::Relaxed);

        log_failure(
            "request count",
            self.registry.counter_increment(
                HTTP_REQUESTS_TOTAL,
                &[("method", method), ("endpoint", endpoint), ("status_code", status.as_str())],
                1.0,
            ),
        );
        log_failure(
            "request duration",
            self.registry
                .histogram_observe(HTTP_REQUEST_DURATION_SECONDS, &labels, seconds),
        );
        log_failure(
            "processing time",
            self.registry
                .histogram_observe(HTTP_REQUEST_PROCESSING_SECONDS, &labels, seconds),
        );

        if let Some(size) = outcome.response_size {
            log_failure(
                "response size",
                self.registry
                    .histogram_observe(HTTP_RESPONSE_SIZE_BYTES, &labels, size as f64),
            );
        }

        if let Some(exception) = outcome.exception {
            log_failure(
                "exception count",
                self.registry.counter_increment(
                    HTTP_REQUESTS_EXCEPTIONS_TOTAL,
                    &[("method", method), ("endpoint", endpoint), ("exception_type", exception)],
                    1.0,
                ),
            );
        }
    }
}

/// Bookkeeping failures are never allowed to affect the request.
fn log_failure(what: &str, result: Result<(), MetricsError>) {
    if let Err(err) = result {
        tracing::warn!(error = %err, "failed to record {what}");
    }
}

/// Guard held for the lifetime of one request.
pub struct RequestTracker {
    metrics: Arc<HttpMetrics>,
    method: String,
    endpoint: String,
    started_at: Instant,
    outcome: Option<RequestOutcome>,
}

impl RequestTracker {
    /// Record the outcome and release the in-progress slot.
    pub fn finish(mut self, outcome: RequestOutcome) -> Duration {
        // ---
        let elapsed = self.started_at.elapsed();
        self.outcome = Some(outcome);
        elapsed
    }
}

impl Drop for RequestTracker {
    fn drop(&mut self) {
        // ---
        let outcome = self.outcome.take().unwrap_or_else(|| {
            tracing::debug!(method = %self.method, endpoint = %self.endpoint, "request cancelled");
            RequestOutcome::failed("cancelled")
        });

        self.metrics.complete(
            &self.method,
            &self.endpoint,
            self.started_at.elapsed(),
            &outcome,
        );
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::SeriesValue;
    use crate::infrastructure::metrics::MetricsRegistry;

    fn setup() -> (RegistryPtr, Arc<HttpMetrics>) {
        let registry = Arc::new(MetricsRegistry::new());
        let metrics = HttpMetrics::register(Arc::clone(&registry)).unwrap();
        (registry, metrics)
    }

    fn in_progress(registry: &MetricsRegistry, method: &str, endpoint: &str) -> f64 {
        match registry
            .value(HTTP_REQUESTS_IN_PROGRESS, &[("method", method), ("endpoint", endpoint)])
            .unwrap()
        {
            Some(SeriesValue::Gauge(v)) => v,
            None => 0.0,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn counter(registry: &MetricsRegistry, name: &str, labels: &[(&str, &str)]) -> f64 {
        match registry.value(name, labels).unwrap() {
            Some(SeriesValue::Counter(v)) => v,
            None => 0.0,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn registering_twice_is_harmless() {
        // ---
        let (registry, _) = setup();
        assert!(HttpMetrics::register(Arc::clone(&registry)).is_ok());
        assert_eq!(registry.family_names().len(), 7);
    }

    #[test]
    fn finish_records_every_instrument() {
        // ---
        let (registry, metrics) = setup();

        let tracker = metrics.start_request("POST", "/api/v1/data", Some(120));
        assert_eq!(in_progress(&registry, "POST", "/api/v1/data"), 1.0);
        assert_eq!(metrics.active_requests(), 1);

        tracker.finish(RequestOutcome::completed(201, Some(300)));

        assert_eq!(in_progress(&registry, "POST", "/api/v1/data"), 0.0);
        assert_eq!(metrics.active_requests(), 0);
        assert_eq!(
            counter(
                &registry,
                HTTP_REQUESTS_TOTAL,
                &[("method", "POST"), ("endpoint", "/api/v1/data"), ("status_code", "201")]
            ),
            1.0
        );

        let labels = [("method", "POST"), ("endpoint", "/api/v1/data")];
        for name in [
            HTTP_REQUEST_DURATION_SECONDS,
            HTTP_REQUEST_PROCESSING_SECONDS,
            HTTP_REQUEST_SIZE_BYTES,
            HTTP_RESPONSE_SIZE_BYTES,
        ] {
            match registry.value(name, &labels).unwrap() {
                Some(SeriesValue::Histogram(h)) => assert_eq!(h.count, 1, "{name}"),
                other => panic!("{name}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn dropped_tracker_counts_as_cancelled() {
        // ---
        let (registry, metrics) = setup();

        let tracker = metrics.start_request("GET", "/slow", None);
        drop(tracker);

        assert_eq!(in_progress(&registry, "GET", "/slow"), 0.0);
        assert_eq!(
            counter(
                &registry,
                HTTP_REQUESTS_EXCEPTIONS_TOTAL,
                &[("method", "GET"), ("endpoint", "/slow"), ("exception_type", "cancelled")]
            ),
            1.0
        );
        assert_eq!(
            counter(
                &registry,
                HTTP_REQUESTS_TOTAL,
                &[("method", "GET"), ("endpoint", "/slow"), ("status_code", "500")]
            ),
            1.0
        );
    }

    #[test]
    fn interleaved_requests_return_to_zero() {
        // ---
        let (registry, metrics) = setup();

        let a = metrics.start_request("GET", "/a", None);
        let b = metrics.start_request("GET", "/a", None);
        let c = metrics.start_request("PUT", "/a", None);
        assert_eq!(in_progress(&registry, "GET", "/a"), 2.0);

        b.finish(RequestOutcome::completed(200, None));
        drop(c);
        assert!(in_progress(&registry, "GET", "/a") >= 0.0);
        a.finish(RequestOutcome::failed("panic"));

        assert_eq!(in_progress(&registry, "GET", "/a"), 0.0);
        assert_eq!(in_progress(&registry, "PUT", "/a"), 0.0);
        assert_eq!(metrics.active_requests(), 0);
    }

    #[test]
    fn concurrent_trackers_balance() {
        // ---
        let (registry, metrics) = setup();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for j in 0..200 {
                        let tracker = metrics.start_request("GET", "/hot", None);
                        if (i + j) % 3 == 0 {
                            drop(tracker);
                        } else {
                            tracker.finish(RequestOutcome::completed(200, Some(10)));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(in_progress(&registry, "GET", "/hot"), 0.0);
        assert_eq!(metrics.active_requests(), 0);
    }
}
