//! In-process metric registry backed by a [`prometheus::Registry`].
//!
//! Families are registered once at startup and looked up by name on every
//! observation. Each family wraps a prometheus vector (`CounterVec`,
//! `GaugeVec` or `HistogramVec`) and keeps an index of the series it has
//! handed out, so callers can read values back without creating series.

use crate::domain::{
    HistogramSnapshot, MetricDescriptor, MetricKind, MetricsError, RenderError, SeriesValue,
};
use prometheus::core::Collector;
use prometheus::{
    proto, Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
    Registry,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use super::exposition;

/// Label values in declaration order.
type LabelValues = Vec<String>;

enum Instrument {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

impl Instrument {
    fn new(descriptor: &MetricDescriptor) -> prometheus::Result<Self> {
        // ---
        let label_names: Vec<&str> = descriptor.label_names().iter().map(String::as_str).collect();
        let (name, help) = (descriptor.name(), descriptor.help());

        match descriptor.kind() {
            MetricKind::Counter => {
                CounterVec::new(Opts::new(name, help), &label_names).map(Instrument::Counter)
            }
            MetricKind::Gauge => {
                GaugeVec::new(Opts::new(name, help), &label_names).map(Instrument::Gauge)
            }
            MetricKind::Histogram { buckets } => {
                // prometheus adds the +Inf bucket itself
                let finite = buckets.iter().copied().filter(|b| b.is_finite()).collect();
                HistogramVec::new(HistogramOpts::new(name, help).buckets(finite), &label_names)
                    .map(Instrument::Histogram)
            }
        }
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Instrument::Counter(vec) => Box::new(vec.clone()),
            Instrument::Gauge(vec) => Box::new(vec.clone()),
            Instrument::Histogram(vec) => Box::new(vec.clone()),
        }
    }

    fn child(&self, values: &[&str]) -> prometheus::Result<Series> {
        // ---
        match self {
            Instrument::Counter(vec) => vec.get_metric_with_label_values(values).map(Series::Counter),
            Instrument::Gauge(vec) => vec.get_metric_with_label_values(values).map(Series::Gauge),
            Instrument::Histogram(vec) => {
                vec.get_metric_with_label_values(values).map(Series::Histogram)
            }
        }
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        match self {
            Instrument::Counter(vec) => vec.collect(),
            Instrument::Gauge(vec) => vec.collect(),
            Instrument::Histogram(vec) => vec.collect(),
        }
    }
}

/// Handle to one labeled series. Clones share the underlying value.
#[derive(Clone)]
enum Series {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
}

impl Series {
    fn snapshot(&self) -> SeriesValue {
        // ---
        match self {
            Series::Counter(counter) => SeriesValue::Counter(counter.get()),
            Series::Gauge(gauge) => SeriesValue::Gauge(gauge.get()),
            Series::Histogram(histogram) => SeriesValue::Histogram(HistogramSnapshot {
                sum: histogram.get_sample_sum(),
                count: histogram.get_sample_count(),
            }),
        }
    }
}

/// One registered family and the series handed out so far.
pub(super) struct MetricFamily {
    descriptor: MetricDescriptor,
    instrument: Instrument,
    series: RwLock<BTreeMap<LabelValues, Series>>,
}

impl MetricFamily {
    pub(super) fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Whether any series exists. Series are never removed, so once this is
    /// true [`MetricFamily::collect`] is never empty.
    pub(super) fn has_series(&self) -> Result<bool, RenderError> {
        let series = self.series.read().map_err(|_| RenderError::Poisoned)?;
        Ok(!series.is_empty())
    }

    pub(super) fn collect(&self) -> Vec<proto::MetricFamily> {
        self.instrument.collect()
    }

    /// Reorder supplied pairs into declaration order, rejecting missing,
    /// extra or repeated keys.
    fn bind_labels(&self, labels: &[(&str, &str)]) -> Result<LabelValues, MetricsError> {
        // ---
        let declared = self.descriptor.label_names();
        if labels.len() != declared.len() {
            return Err(self.label_mismatch(labels));
        }

        declared
            .iter()
            .map(|name| {
                let mut matches = labels.iter().filter(|(key, _)| key == name);
                match (matches.next(), matches.next()) {
                    (Some((_, value)), None) => Ok((*value).to_string()),
                    _ => Err(self.label_mismatch(labels)),
                }
            })
            .collect()
    }

    fn series(&self, labels: &[(&str, &str)]) -> Result<Series, MetricsError> {
        // ---
        let values = self.bind_labels(labels)?;

        {
            let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = series.get(&values) {
                return Ok(existing.clone());
            }
        }

        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = series.get(&values) {
            return Ok(existing.clone());
        }

        let bound: Vec<&str> = values.iter().map(String::as_str).collect();
        let created = self
            .instrument
            .child(&bound)
            .map_err(|_| self.label_mismatch(labels))?;
        series.insert(values, created.clone());
        Ok(created)
    }

    fn existing_series(&self, labels: &[(&str, &str)]) -> Result<Option<Series>, MetricsError> {
        let values = self.bind_labels(labels)?;
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        Ok(series.get(&values).cloned())
    }

    fn label_mismatch(&self, labels: &[(&str, &str)]) -> MetricsError {
        MetricsError::LabelMismatch {
            name: self.descriptor.name().to_string(),
            expected: self.descriptor.label_names().to_vec(),
            supplied: labels.iter().map(|(k, _)| (*k).to_string()).collect(),
        }
    }

    fn wrong_kind(&self, expected: &'static str) -> MetricsError {
        MetricsError::WrongKind {
            name: self.descriptor.name().to_string(),
            expected,
            actual: self.descriptor.kind().as_str(),
        }
    }
}

#[derive(Default)]
struct FamilyTable {
    /// Registration order, which is also exposition order.
    ordered: Vec<Arc<MetricFamily>>,
    by_name: HashMap<String, Arc<MetricFamily>>,
}

/// Thread-safe store of metric families and their series.
#[derive(Default)]
pub struct MetricsRegistry {
    inner: Registry,
    families: RwLock<FamilyTable>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family.
    ///
    /// Registering a descriptor compatible with an existing one is a no-op;
    /// anything else under the same name is a [`MetricsError::DuplicateMetric`].
    pub fn register(&self, descriptor: MetricDescriptor) -> Result<(), MetricsError> {
        // ---
        let mut table = self.families.write().unwrap_or_else(PoisonError::into_inner);
        let name = descriptor.name().to_string();

        if let Some(existing) = table.by_name.get(&name) {
            if existing.descriptor.is_compatible_with(&descriptor) {
                return Ok(());
            }
            return Err(MetricsError::DuplicateMetric { name });
        }

        let instrument = Instrument::new(&descriptor)
            .map_err(|err| MetricsError::InvalidDescriptor(format!("{name}: {err}")))?;
        self.inner
            .register(instrument.collector())
            .map_err(|err| match err {
                prometheus::Error::AlreadyReg => MetricsError::DuplicateMetric { name: name.clone() },
                other => MetricsError::InvalidDescriptor(format!("{name}: {other}")),
            })?;

        tracing::debug!(metric = %name, kind = %descriptor.kind(), "registered metric");
        let family = Arc::new(MetricFamily {
            descriptor,
            instrument,
            series: RwLock::new(BTreeMap::new()),
        });
        table.by_name.insert(name, Arc::clone(&family));
        table.ordered.push(family);
        Ok(())
    }

    /// Add a non-negative `delta` to a counter series.
    pub fn counter_increment(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        delta: f64,
    ) -> Result<(), MetricsError> {
        // ---
        let family = self.family(name)?;
        if !matches!(family.descriptor.kind(), MetricKind::Counter) {
            return Err(family.wrong_kind("counter"));
        }
        if !delta.is_finite() || delta < 0.0 {
            return Err(invalid(name, delta));
        }

        match family.series(labels)? {
            Series::Counter(counter) => counter.inc_by(delta),
            _ => return Err(family.wrong_kind("counter")),
        }
        Ok(())
    }

    /// Overwrite a gauge series.
    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) -> Result<(), MetricsError> {
        self.update_gauge(name, labels, value, |gauge| gauge.set(value))
    }

    /// Add `delta` (possibly negative) to a gauge series.
    pub fn gauge_add(&self, name: &str, labels: &[(&str, &str)], delta: f64) -> Result<(), MetricsError> {
        self.update_gauge(name, labels, delta, |gauge| gauge.add(delta))
    }

    /// Record one observation into a histogram series.
    pub fn histogram_observe(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<(), MetricsError> {
        // ---
        let family = self.family(name)?;
        if !matches!(family.descriptor.kind(), MetricKind::Histogram { .. }) {
            return Err(family.wrong_kind("histogram"));
        }
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(name, value));
        }

        match family.series(labels)? {
            Series::Histogram(histogram) => histogram.observe(value),
            _ => return Err(family.wrong_kind("histogram")),
        }
        Ok(())
    }

    /// Current value of one series, `None` if it has never been observed.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Result<Option<SeriesValue>, MetricsError> {
        // ---
        let family = self.family(name)?;
        Ok(family.existing_series(labels)?.map(|series| series.snapshot()))
    }

    /// Sum of all counter or gauge series in a family.
    pub fn family_total(&self, name: &str) -> Result<f64, MetricsError> {
        // ---
        let family = self.family(name)?;
        if matches!(family.descriptor.kind(), MetricKind::Histogram { .. }) {
            return Err(family.wrong_kind("counter or gauge"));
        }

        let series = family.series.read().unwrap_or_else(PoisonError::into_inner);
        Ok(series
            .values()
            .map(|series| match series {
                Series::Counter(counter) => counter.get(),
                Series::Gauge(gauge) => gauge.get(),
                Series::Histogram(_) => 0.0,
            })
            .sum())
    }

    /// Names of all registered families, in registration order.
    pub fn family_names(&self) -> Vec<String> {
        // ---
        let table = self.families.read().unwrap_or_else(PoisonError::into_inner);
        table
            .ordered
            .iter()
            .map(|family| family.descriptor.name().to_string())
            .collect()
    }

    /// Render every family in Prometheus text exposition format 0.0.4.
    pub fn render(&self) -> Result<String, RenderError> {
        // ---
        let families: Vec<Arc<MetricFamily>> = {
            let table = self.families.read().map_err(|_| RenderError::Poisoned)?;
            table.ordered.clone()
        };

        exposition::render(&families)
    }

    fn family(&self, name: &str) -> Result<Arc<MetricFamily>, MetricsError> {
        // ---
        let table = self.families.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| MetricsError::UnknownMetric(name.to_string()))
    }

    fn update_gauge(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        value: f64,
        update: impl FnOnce(&Gauge),
    ) -> Result<(), MetricsError> {
        // ---
        let family = self.family(name)?;
        if !matches!(family.descriptor.kind(), MetricKind::Gauge) {
            return Err(family.wrong_kind("gauge"));
        }
        if !value.is_finite() {
            return Err(invalid(name, value));
        }

        match family.series(labels)? {
            Series::Gauge(gauge) => update(&gauge),
            _ => return Err(family.wrong_kind("gauge")),
        }
        Ok(())
    }
}

fn invalid(name: &str, value: f64) -> MetricsError {
    MetricsError::InvalidObservation {
        name: name.to_string(),
        value,
    }
}
