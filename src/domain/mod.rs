mod data_item;
mod metrics;
mod probe;
mod repository;

// Publicly expose the metric identity types and registry errors
pub use metrics::{
    HistogramSnapshot, MetricDescriptor, MetricKind, MetricsError, RenderError, SeriesValue,
};

// Publicly expose the resource probe abstraction
pub use probe::{DiskSample, MemorySample, ProcessSample, ResourceProbe, SampleReadError};

// Publicly expose persistence abstractions
pub use data_item::{DataItem, DataStats, ItemQuery, NewDataItem};
pub use repository::{Repository, RepositoryPtr};
