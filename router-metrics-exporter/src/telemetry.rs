//! Self-metrics of the exporter, kept in an explicit `prometheus-client`
//! registry that is built at startup and handed to the HTTP layer.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::catalog::Entity;
use crate::error::QueryError;

/// Scrape duration buckets in seconds. Queries time out after tens of seconds.
const SCRAPE_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Labels for failed entity fetches.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchFailureLabels {
    /// Entity short name ("router", "connection", "link").
    pub entity: String,
    /// Failure kind ("connect", "timeout", "protocol", "status", "malformed").
    pub kind: String,
}

/// Handles to the exporter's own metrics.
///
/// Cloning shares the underlying values.
#[derive(Clone, Debug)]
pub struct ExporterMetrics {
    scrapes: Counter,
    scrape_errors: Counter,
    fetch_failures: Family<FetchFailureLabels, Counter>,
    scrape_duration: Histogram,
}

impl ExporterMetrics {
    /// Create the metrics and register them with `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::unregistered();

        registry.register(
            "router_exporter_scrapes",
            "Collection passes started by scrape requests",
            metrics.scrapes.clone(),
        );
        registry.register(
            "router_exporter_scrape_errors",
            "Collection passes that failed with a contract violation",
            metrics.scrape_errors.clone(),
        );
        registry.register(
            "router_exporter_fetch_failures",
            "Entity queries that returned no data",
            metrics.fetch_failures.clone(),
        );
        registry.register(
            "router_exporter_scrape_duration_seconds",
            "Duration of a full collection pass",
            metrics.scrape_duration.clone(),
        );

        metrics
    }

    /// Create metrics that no registry exposes.
    pub fn unregistered() -> Self {
        Self {
            scrapes: Counter::default(),
            scrape_errors: Counter::default(),
            fetch_failures: Family::default(),
            scrape_duration: Histogram::new(SCRAPE_DURATION_BUCKETS.iter().copied()),
        }
    }

    pub fn record_scrape(&self, duration_secs: f64, success: bool) {
        self.scrapes.inc();
        self.scrape_duration.observe(duration_secs);
        if !success {
            self.scrape_errors.inc();
        }
    }

    pub fn record_fetch_failure(&self, entity: Entity, error: &QueryError) {
        self.fetch_failures
            .get_or_create(&FetchFailureLabels {
                entity: entity.as_str().to_string(),
                kind: error.kind().to_string(),
            })
            .inc();
    }

    /// Number of fetch failures recorded for an entity and failure kind.
    pub fn fetch_failures(&self, entity: Entity, kind: &str) -> u64 {
        self.fetch_failures
            .get_or_create(&FetchFailureLabels {
                entity: entity.as_str().to_string(),
                kind: kind.to_string(),
            })
            .get()
    }

    pub fn scrapes(&self) -> u64 {
        self.scrapes.get()
    }
}

/// Encode a registry for appending to a text format 0.0.4 scrape.
///
/// The OpenMetrics `# EOF` terminator is dropped. Counter samples keep their
/// `_total` suffix, which 0.0.4 parsers accept under the declared family.
pub fn encode(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, registry)?;

    if let Some(len) = buffer.strip_suffix("# EOF\n").map(str::len) {
        buffer.truncate(len);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_register_and_encode() {
        let mut registry = Registry::default();
        let metrics = ExporterMetrics::new(&mut registry);

        metrics.record_scrape(0.02, true);
        metrics.record_fetch_failure(Entity::Link, &QueryError::Timeout(Duration::from_secs(30)));

        let output = encode(&registry).expect("encoding should succeed");

        assert!(output.contains("router_exporter_scrapes_total 1"));
        assert!(output.contains("router_exporter_scrape_errors_total 0"));
        assert!(output.contains("entity=\"link\""));
        assert!(output.contains("kind=\"timeout\""));
        assert!(output.contains("router_exporter_scrape_duration_seconds_count 1"));
        assert!(!output.contains("# EOF"));
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn test_failed_scrape_counts_error() {
        let metrics = ExporterMetrics::unregistered();
        metrics.record_scrape(0.5, false);

        assert_eq!(metrics.scrapes(), 1);
        assert_eq!(metrics.scrape_errors.get(), 1);
    }

    #[test]
    fn test_fetch_failures_by_kind() {
        let metrics = ExporterMetrics::unregistered();
        let refused = QueryError::Connect("connection refused".into());

        metrics.record_fetch_failure(Entity::Router, &refused);
        metrics.record_fetch_failure(Entity::Router, &refused);

        assert_eq!(metrics.fetch_failures(Entity::Router, "connect"), 2);
        assert_eq!(metrics.fetch_failures(Entity::Router, "timeout"), 0);
    }
}
