//! Metric identity and the registry error taxonomy.
//!
//! A [`MetricDescriptor`] names a measurable quantity: its kind, help text
//! and the ordered label names every observation must bind. Descriptors are
//! validated when constructed and never change afterwards.

use std::fmt;
use thiserror::Error;

/// Kind of a metric family, as written on the `# TYPE` line.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    Counter,
    Gauge,
    /// Ascending upper bounds, always terminated by `+Inf`.
    Histogram { buckets: Vec<f64> },
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram { .. } => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one metric family. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    kind: MetricKind,
    label_names: Vec<String>,
}

impl MetricDescriptor {
    /// Describe a monotonically increasing counter.
    pub fn counter(name: &str, help: &str, label_names: &[&str]) -> Result<Self, MetricsError> {
        Self::build(name, help, MetricKind::Counter, label_names)
    }

    /// Describe a gauge that may move in either direction.
    pub fn gauge(name: &str, help: &str, label_names: &[&str]) -> Result<Self, MetricsError> {
        Self::build(name, help, MetricKind::Gauge, label_names)
    }

    /// Describe a histogram.
    ///
    /// `buckets` must be finite and strictly ascending; a trailing `+Inf`
    /// boundary is appended when it is not already present.
    pub fn histogram(
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<Self, MetricsError> {
        // ---
        let mut bounds: Vec<f64> = buckets.to_vec();
        if bounds.last() == Some(&f64::INFINITY) {
            bounds.pop();
        }

        if bounds.is_empty() {
            return Err(MetricsError::InvalidDescriptor(format!(
                "{name}: at least one finite bucket boundary is required"
            )));
        }
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(MetricsError::InvalidDescriptor(format!(
                "{name}: bucket boundaries must be finite"
            )));
        }
        if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(MetricsError::InvalidDescriptor(format!(
                "{name}: bucket boundaries must be strictly ascending"
            )));
        }
        if label_names.contains(&"le") {
            return Err(MetricsError::InvalidDescriptor(format!(
                "{name}: `le` is reserved for histogram buckets"
            )));
        }

        bounds.push(f64::INFINITY);
        Self::build(name, help, MetricKind::Histogram { buckets: bounds }, label_names)
    }

    fn build(
        name: &str,
        help: &str,
        kind: MetricKind,
        label_names: &[&str],
    ) -> Result<Self, MetricsError> {
        // ---
        if !is_valid_metric_name(name) {
            return Err(MetricsError::InvalidDescriptor(format!(
                "invalid metric name `{name}`"
            )));
        }

        if help.trim().is_empty() {
            return Err(MetricsError::InvalidDescriptor(format!("{name}: help text is empty")));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(label_names.len());
        for label in label_names {
            if !is_valid_label_name(label) {
                return Err(MetricsError::InvalidDescriptor(format!(
                    "{name}: invalid label name `{label}`"
                )));
            }
            if seen.contains(label) {
                return Err(MetricsError::InvalidDescriptor(format!(
                    "{name}: duplicate label name `{label}`"
                )));
            }
            seen.push(label);
        }

        Ok(Self {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            label_names: label_names.iter().map(|l| (*l).to_string()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> &MetricKind {
        &self.kind
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Same kind (buckets included) and same ordered label names.
    ///
    /// Help text does not take part in identity.
    pub fn is_compatible_with(&self, other: &MetricDescriptor) -> bool {
        // ---
        self.name == other.name && self.kind == other.kind && self.label_names == other.label_names
    }
}

fn is_valid_metric_name(name: &str) -> bool {
    // ---
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    // ---
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Errors raised by registry operations.
///
/// All of these are programmer errors: they surface at startup or on the
/// first use of a misconfigured call site, not at steady state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("metric `{name}` is already registered with a different kind or label set")]
    DuplicateMetric { name: String },

    #[error("metric `{0}` is not registered")]
    UnknownMetric(String),

    #[error("labels {supplied:?} do not match {expected:?} declared for `{name}`")]
    LabelMismatch {
        name: String,
        expected: Vec<String>,
        supplied: Vec<String>,
    },

    #[error("invalid observation {value} for `{name}`")]
    InvalidObservation { name: String, value: f64 },

    #[error("metric `{name}` is a {actual}, not a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid metric descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Failure to produce exposition text. Never returned with partial output.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("metrics registry lock poisoned")]
    Poisoned,

    #[error("failed to encode exposition text: {0}")]
    Encode(String),
}

/// Point-in-time value of one labeled series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    Counter(f64),
    Gauge(f64),
    Histogram(HistogramSnapshot),
}

/// Running totals of one histogram series. Bucket counts are only
/// exposed through the rendered text.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub sum: f64,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn histogram_appends_infinity_once() {
        // ---
        let d = MetricDescriptor::histogram("latency", "h", &[], &[0.1, 1.0]).unwrap();
        assert_eq!(
            d.kind(),
            &MetricKind::Histogram {
                buckets: vec![0.1, 1.0, f64::INFINITY]
            }
        );

        let d = MetricDescriptor::histogram("latency", "h", &[], &[0.1, f64::INFINITY]).unwrap();
        assert_eq!(
            d.kind(),
            &MetricKind::Histogram {
                buckets: vec![0.1, f64::INFINITY]
            }
        );
    }

    #[test]
    fn histogram_rejects_unsorted_buckets() {
        // ---
        let err = MetricDescriptor::histogram("h", "h", &[], &[1.0, 0.5]).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidDescriptor(_)));
    }

    #[test]
    fn histogram_rejects_le_label() {
        // ---
        let err = MetricDescriptor::histogram("h", "h", &["le"], &[1.0]).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidDescriptor(_)));
    }

    #[test]
    fn rejects_bad_names() {
        // ---
        assert!(MetricDescriptor::counter("9lives", "x", &[]).is_err());
        assert!(MetricDescriptor::counter("has-dash", "x", &[]).is_err());
        assert!(MetricDescriptor::counter("ok_name", "x", &["__reserved"]).is_err());
        assert!(MetricDescriptor::counter("ok_name", "x", &["a", "a"]).is_err());
        assert!(MetricDescriptor::gauge("ns:ok_name", "x", &["type"]).is_ok());
    }

    #[test]
    fn rejects_empty_help_and_bucketless_histograms() {
        // ---
        assert!(MetricDescriptor::counter("c", " ", &[]).is_err());
        assert!(MetricDescriptor::histogram("h", "h", &[], &[]).is_err());
        assert!(MetricDescriptor::histogram("h", "h", &[], &[f64::INFINITY]).is_err());
    }

    #[test]
    fn compatibility_ignores_help() {
        // ---
        let a = MetricDescriptor::counter("c", "one", &["x"]).unwrap();
        let b = MetricDescriptor::counter("c", "two", &["x"]).unwrap();
        let c = MetricDescriptor::gauge("c", "one", &["x"]).unwrap();
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }
}
