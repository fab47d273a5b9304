//! Label-keyed accumulation of metric values for one collection pass.

/// Prometheus metric kind of an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Point-in-time value, overwritten on every scrape.
    Gauge,
    /// Cumulative value reported by the router.
    Counter,
}

impl MetricKind {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// Label values of one series, aligned with the metric's label names.
pub type LabelTuple = Vec<String>;

/// One exported series of a metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub labels: LabelTuple,
    pub value: i64,
}

/// Immutable export record of one accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub label_names: Vec<String>,
    /// Samples in accumulation order, label tuples pairwise distinct.
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    /// Find the sample for an exact label tuple.
    pub fn sample(&self, labels: &[&str]) -> Option<&Sample> {
        self.samples.iter().find(|s| s.labels == labels)
    }
}

/// Accumulates values for one named metric, summing values that share a
/// label tuple.
///
/// Lookups are a linear scan; a router reports tens of distinct tuples per
/// metric, so a hash index is not worth its cost here.
#[derive(Debug, Clone)]
pub struct MetricAccumulator {
    name: String,
    help: String,
    kind: MetricKind,
    label_names: Vec<String>,
    samples: Vec<Sample>,
}

impl MetricAccumulator {
    /// Create an empty accumulator.
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: Vec<String>,
        kind: MetricKind,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            label_names,
            samples: Vec::new(),
        }
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Add `value` to the series identified by `labels`, creating it if needed.
    pub fn accumulate(&mut self, labels: LabelTuple, value: i64) {
        debug_assert_eq!(labels.len(), self.label_names.len());

        match self.samples.iter_mut().find(|s| s.labels == labels) {
            Some(sample) => sample.value = sample.value.saturating_add(value),
            None => self.samples.push(Sample { labels, value }),
        }
    }

    /// Number of distinct series accumulated so far.
    pub fn series_count(&self) -> usize {
        self.samples.len()
    }

    /// Export the current state without resetting it.
    pub fn snapshot(&self) -> MetricFamily {
        MetricFamily {
            name: self.name.clone(),
            help: self.help.clone(),
            kind: self.kind,
            label_names: self.label_names.clone(),
            samples: self.samples.clone(),
        }
    }
}
