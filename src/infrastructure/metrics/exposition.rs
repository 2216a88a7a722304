//! Prometheus text exposition format, version 0.0.4.

use crate::domain::RenderError;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use super::registry::MetricFamily;

/// Content type served alongside [`render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encode families in the given order.
///
/// `TextEncoder` rejects a family with no series, so those are written as
/// bare HELP and TYPE lines.
pub(super) fn render(families: &[Arc<MetricFamily>]) -> Result<String, RenderError> {
    // ---
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    for family in families {
        if family.has_series()? {
            encoder
                .encode(&family.collect(), &mut buffer)
                .map_err(|err| RenderError::Encode(err.to_string()))?;
        } else {
            let descriptor = family.descriptor();
            let name = descriptor.name();
            let header = format!(
                "# HELP {name} {}\n# TYPE {name} {}\n",
                escape_help(descriptor.help()),
                descriptor.kind()
            );
            buffer.extend_from_slice(header.as_bytes());
        }
    }

    String::from_utf8(buffer).map_err(|err| RenderError::Encode(err.to_string()))
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    // ---
    use crate::domain::MetricDescriptor;
    use crate::infrastructure::metrics::MetricsRegistry;
    use regex::Regex;

    fn sample_line() -> Regex {
        Regex::new(
            r#"^[a-zA-Z_:][a-zA-Z0-9_:]*(\{[a-zA-Z_][a-zA-Z0-9_]*="(?:[^"\\]|\\.)*"(,[a-zA-Z_][a-zA-Z0-9_]*="(?:[^"\\]|\\.)*")*\})? (NaN|[+-]Inf|-?[0-9.e+-]+)$"#,
        )
        .unwrap()
    }

    fn populated_registry() -> MetricsRegistry {
        // ---
        let registry = MetricsRegistry::new();
        registry
            .register(MetricDescriptor::counter("jobs_total", "Jobs done", &["queue", "result"]).unwrap())
            .unwrap();
        registry
            .register(MetricDescriptor::gauge("temperature", "Current\ntemperature", &[]).unwrap())
            .unwrap();
        registry
            .register(MetricDescriptor::histogram("wait_seconds", "Wait", &["queue"], &[0.5, 1.0]).unwrap())
            .unwrap();
        registry
            .register(MetricDescriptor::counter("never_observed_total", "Idle", &["x"]).unwrap())
            .unwrap();

        registry
            .counter_increment("jobs_total", &[("result", "ok"), ("queue", "a\"b")], 2.0)
            .unwrap();
        registry.gauge_set("temperature", &[], 21.5).unwrap();
        registry
            .histogram_observe("wait_seconds", &[("queue", "fast")], 0.25)
            .unwrap();
        registry
            .histogram_observe("wait_seconds", &[("queue", "fast")], 3.0)
            .unwrap();
        registry
    }

    #[test]
    fn renders_help_type_and_samples() {
        // ---
        let text = populated_registry().render().unwrap();

        assert!(text.contains("# HELP jobs_total Jobs done\n# TYPE jobs_total counter\n"));
        assert!(text.contains("jobs_total{queue=\"a\\\"b\",result=\"ok\"} 2\n"));
        assert!(text.contains("# HELP temperature Current\\ntemperature\n"));
        assert!(text.contains("temperature 21.5\n"));
        assert!(text.contains("wait_seconds_bucket{queue=\"fast\",le=\"0.5\"} 1\n"));
        assert!(text.contains("wait_seconds_bucket{queue=\"fast\",le=\"1\"} 1\n"));
        assert!(text.contains("wait_seconds_bucket{queue=\"fast\",le=\"+Inf\"} 2\n"));
        assert!(text.contains("wait_seconds_sum{queue=\"fast\"} 3.25\n"));
        assert!(text.contains("wait_seconds_count{queue=\"fast\"} 2\n"));
    }

    #[test]
    fn family_without_series_still_has_help_and_type() {
        // ---
        let text = populated_registry().render().unwrap();

        assert!(text.contains("# HELP never_observed_total Idle\n# TYPE never_observed_total counter\n"));
        assert!(!text.lines().any(|line| line.starts_with("never_observed_total")));
    }

    #[test]
    fn output_is_valid_exposition_text() {
        // ---
        let registry = populated_registry();
        let text = registry.render().unwrap();
        let sample = sample_line();

        let mut type_lines = 0;
        for line in text.lines() {
            if line.starts_with("# TYPE ") {
                type_lines += 1;
                let kind = line.rsplit(' ').next().unwrap();
                assert!(["counter", "gauge", "histogram"].contains(&kind), "bad type line: {line}");
            } else if line.starts_with("# HELP ") {
                continue;
            } else {
                assert!(sample.is_match(line), "invalid sample line: {line}");
            }
        }

        assert_eq!(type_lines, registry.family_names().len());
    }

    #[test]
    fn family_order_follows_registration() {
        // ---
        let text = populated_registry().render().unwrap();
        let jobs = text.find("# TYPE jobs_total").unwrap();
        let wait = text.find("# TYPE wait_seconds").unwrap();
        let idle = text.find("# TYPE never_observed_total").unwrap();
        assert!(jobs < wait && wait < idle);
    }
}
