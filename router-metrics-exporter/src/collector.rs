//! Collection pass: query each management entity, enrich the rows and fold
//! them into the metric catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::accumulator::{LabelTuple, MetricAccumulator, MetricFamily};
use crate::catalog::{self, Entity, METRICS};
use crate::enrich::{enrich_connections, enrich_links};
use crate::error::{CollectError, QueryError, Result};
use crate::management::ManagementClient;
use crate::response::{FieldValue, TabularResponse};
use crate::telemetry::ExporterMetrics;

/// Drives one collection pass per call to [`RouterCollector::collect`].
///
/// Holds no metric state between passes; every pass starts from empty
/// accumulators and fresh entity snapshots.
pub struct RouterCollector {
    client: Arc<dyn ManagementClient>,
    query_timeout: Duration,
    metrics: ExporterMetrics,
}

impl RouterCollector {
    /// Create a collector over a management client.
    pub fn new(
        client: Arc<dyn ManagementClient>,
        query_timeout: Duration,
        metrics: ExporterMetrics,
    ) -> Self {
        Self {
            client,
            query_timeout,
            metrics,
        }
    }

    /// Self-metrics handle shared with the HTTP layer.
    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Run one full collection pass.
    ///
    /// Entities that cannot be fetched are left out of the result. Contract
    /// violations (malformed replies, missing source or value attributes)
    /// fail the whole pass.
    pub async fn collect(&self) -> Result<Vec<MetricFamily>> {
        let mut accumulators = catalog::accumulators();

        let router = self.fetch(Entity::Router).await?;
        let connections = self.fetch_connections().await?;
        let links = self.fetch_links(connections.as_ref()).await?;

        for (entity, response) in [
            (Entity::Router, &router),
            (Entity::Connection, &connections),
            (Entity::Link, &links),
        ] {
            if let Some(response) = response {
                feed(entity, response, &mut accumulators)?;
            }
        }

        let series: usize = accumulators
            .values()
            .map(MetricAccumulator::series_count)
            .sum();
        let families: Vec<MetricFamily> = METRICS
            .iter()
            .filter_map(|m| accumulators.get(m.name))
            .map(MetricAccumulator::snapshot)
            .collect();

        debug!(
            families = families.len(),
            series,
            "Collection pass complete"
        );

        Ok(families)
    }

    /// Query one entity type.
    ///
    /// Transient failures are logged and yield `None`; a malformed reply is
    /// returned as an error.
    async fn fetch(&self, entity: Entity) -> Result<Option<TabularResponse>> {
        let entity_type = entity.entity_type();

        let result = match timeout(self.query_timeout, self.client.query(entity_type)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(self.query_timeout)),
        };

        match result {
            Ok(response) => {
                debug!(entity = %entity, rows = response.len(), "Fetched entity");
                Ok(Some(response))
            }
            Err(e) => {
                self.metrics.record_fetch_failure(entity, &e);
                if e.is_transient() {
                    warn!(
                        entity = %entity,
                        kind = e.kind(),
                        error = %e,
                        "Error querying router for metrics"
                    );
                    Ok(None)
                } else {
                    Err(CollectError::Malformed {
                        entity: entity_type.to_string(),
                        source: e,
                    })
                }
            }
        }
    }

    async fn fetch_connections(&self) -> Result<Option<TabularResponse>> {
        let Some(mut connections) = self.fetch(Entity::Connection).await? else {
            return Ok(None);
        };
        enrich_connections(&mut connections)?;
        Ok(Some(connections))
    }

    /// Links are only reported together with the connections they join to.
    async fn fetch_links(
        &self,
        connections: Option<&TabularResponse>,
    ) -> Result<Option<TabularResponse>> {
        let Some(connections) = connections else {
            warn!(entity = %Entity::Link, "Skipping links, connections are unavailable");
            return Ok(None);
        };
        let Some(mut links) = self.fetch(Entity::Link).await? else {
            return Ok(None);
        };
        enrich_links(&mut links, connections)?;
        Ok(Some(links))
    }
}

/// Fold every row of `response` into each accumulator fed by `entity`.
fn feed(
    entity: Entity,
    response: &TabularResponse,
    accumulators: &mut HashMap<&'static str, MetricAccumulator>,
) -> Result<()> {
    if response.is_empty() {
        return Ok(());
    }

    for &name in entity.metrics() {
        // Entity metrics are always catalog metrics.
        let Some(accumulator) = accumulators.get_mut(name) else {
            continue;
        };

        let value_idx = response
            .index_of(name)
            .ok_or_else(|| missing_value(name, entity))?;
        let label_idx: Vec<Option<usize>> = accumulator
            .label_names()
            .iter()
            .map(|label| response.index_of(label))
            .collect();

        for row in response.rows() {
            let labels = label_tuple(row, &label_idx);
            let field = &row[value_idx];
            if field.is_null() {
                return Err(missing_value(name, entity));
            }
            let value = field.as_integer().ok_or_else(|| CollectError::NonNumeric {
                metric: name.to_string(),
                value: field.to_string(),
            })?;
            accumulator.accumulate(labels, value);
        }
    }

    Ok(())
}

/// Labels absent from the schema or null in the row become `""`.
fn label_tuple(row: &[FieldValue], label_idx: &[Option<usize>]) -> LabelTuple {
    label_idx
        .iter()
        .map(|idx| idx.map(|i| row[i].to_label()).unwrap_or_default())
        .collect()
}

fn missing_value(metric: &str, entity: Entity) -> CollectError {
    CollectError::MissingValue {
        metric: metric.to_string(),
        entity: entity.entity_type().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Answers queries from canned responses and records what was asked.
    #[derive(Default)]
    struct CannedClient {
        replies: HashMap<&'static str, Vec<Vec<FieldValue>>>,
        columns: HashMap<&'static str, Vec<&'static str>>,
        failures: HashMap<&'static str, fn() -> QueryError>,
        delay: Option<Duration>,
        queried: Mutex<Vec<String>>,
    }

    impl CannedClient {
        fn entity(
            mut self,
            entity: Entity,
            columns: &[&'static str],
            rows: Vec<Vec<FieldValue>>,
        ) -> Self {
            self.columns.insert(entity.entity_type(), columns.to_vec());
            self.replies.insert(entity.entity_type(), rows);
            self
        }

        fn failing(mut self, entity: Entity, error: fn() -> QueryError) -> Self {
            self.failures.insert(entity.entity_type(), error);
            self
        }
    }

    #[async_trait]
    impl ManagementClient for CannedClient {
        async fn query(
            &self,
            entity_type: &str,
        ) -> std::result::Result<TabularResponse, QueryError> {
            self.queried.lock().push(entity_type.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = self.failures.get(entity_type) {
                return Err(error());
            }
            let columns = self
                .columns
                .get(entity_type)
                .map(|c| c.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default();
            let rows = self.replies.get(entity_type).cloned().unwrap_or_default();
            TabularResponse::new(columns, rows)
        }
    }

    fn t(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn i(v: i64) -> FieldValue {
        FieldValue::Int(v)
    }

    const ROUTER_COLUMNS: &[&str] = &[
        "routerId",
        "connectionCount",
        "linkCount",
        "addrCount",
        "autoLinkCount",
        "linkRouteCount",
    ];

    const LINK_COLUMNS: &[&str] = &[
        "identity",
        "connectionId",
        "owningAddr",
        "unsettledCount",
        "deliveryCount",
        "releasedCount",
        "rejectedCount",
        "acceptedCount",
        "undeliveredCount",
        "capacity",
    ];

    fn link_row(conn: &str, addr: FieldValue, deliveries: i64) -> Vec<FieldValue> {
        vec![
            t("l"),
            t(conn),
            addr,
            i(0),
            i(deliveries),
            i(0),
            i(0),
            i(deliveries),
            i(0),
            i(250),
        ]
    }

    fn healthy_client() -> CannedClient {
        CannedClient::default()
            .entity(
                Entity::Router,
                ROUTER_COLUMNS,
                vec![vec![t("Router.A"), i(3), i(5), i(2), i(0), i(1)]],
            )
            .entity(
                Entity::Connection,
                &["identity", "container"],
                vec![vec![t("c1"), t("app1")], vec![t("c2"), t("app1")]],
            )
            .entity(
                Entity::Link,
                LINK_COLUMNS,
                vec![link_row("c1", t("M0orders"), 7)],
            )
    }

    fn collector(client: CannedClient) -> RouterCollector {
        RouterCollector::new(
            Arc::new(client),
            Duration::from_secs(5),
            ExporterMetrics::unregistered(),
        )
    }

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("missing family {}", name))
    }

    #[tokio::test]
    async fn test_collect_end_to_end() {
        let families = collector(healthy_client()).collect().await.unwrap();

        assert_eq!(families.len(), METRICS.len());

        let connections = family(&families, "connectionCount");
        assert_eq!(connections.sample(&["Router.A", ""]).unwrap().value, 3);
        assert_eq!(connections.sample(&["", "app1"]).unwrap().value, 2);

        let links = family(&families, "linkCount");
        assert_eq!(links.sample(&["Router.A", "", ""]).unwrap().value, 5);
        let enriched: Vec<_> = links
            .samples
            .iter()
            .filter(|s| s.labels[2] == "app1")
            .collect();
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].labels, vec!["", "orders", "app1"]);
        assert_eq!(enriched[0].value, 1);

        let deliveries = family(&families, "deliveryCount");
        assert_eq!(deliveries.sample(&["orders"]).unwrap().value, 7);

        assert_eq!(family(&families, "addrCount").sample(&["Router.A"]).unwrap().value, 2);
        assert_eq!(family(&families, "capacity").sample(&["orders"]).unwrap().value, 250);
    }

    #[tokio::test]
    async fn test_links_with_same_address_are_summed() {
        let client = healthy_client().entity(
            Entity::Link,
            LINK_COLUMNS,
            vec![
                link_row("c1", t("M0orders"), 7),
                link_row("c2", t("M0orders"), 3),
                link_row("c1", t("Linvoices"), 1),
            ],
        );

        let families = collector(client).collect().await.unwrap();

        let deliveries = family(&families, "deliveryCount");
        assert_eq!(deliveries.samples.len(), 2);
        assert_eq!(deliveries.sample(&["orders"]).unwrap().value, 10);
        assert_eq!(deliveries.sample(&["invoices"]).unwrap().value, 1);

        let links = family(&families, "linkCount");
        assert_eq!(links.sample(&["", "orders", "app1"]).unwrap().value, 2);
    }

    #[tokio::test]
    async fn test_label_tuples_distinct_after_pass() {
        let client = healthy_client().entity(
            Entity::Link,
            LINK_COLUMNS,
            (0..20)
                .map(|n| link_row(if n % 2 == 0 { "c1" } else { "c2" }, t("M0a"), n))
                .collect(),
        );

        let families = collector(client).collect().await.unwrap();

        for f in &families {
            for (n, s) in f.samples.iter().enumerate() {
                assert!(
                    f.samples[..n].iter().all(|o| o.labels != s.labels),
                    "duplicate series in {}",
                    f.name
                );
            }
        }
    }

    #[tokio::test]
    async fn test_connection_failure_drops_links_only() {
        let client = healthy_client()
            .failing(Entity::Connection, || QueryError::Connect("refused".into()));
        let c = collector(client);

        let families = c.collect().await.unwrap();

        let links = family(&families, "linkCount");
        assert_eq!(links.samples.len(), 1);
        assert_eq!(links.samples[0].labels, vec!["Router.A", "", ""]);
        assert!(family(&families, "deliveryCount").samples.is_empty());
        assert!(family(&families, "capacity").samples.is_empty());

        let connections = family(&families, "connectionCount");
        assert_eq!(connections.samples.len(), 1);
        assert_eq!(connections.sample(&["Router.A", ""]).unwrap().value, 3);

        assert_eq!(c.metrics().fetch_failures(Entity::Connection, "connect"), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_skips_link_query() {
        let client = Arc::new(
            healthy_client().failing(Entity::Connection, || QueryError::Connect("refused".into())),
        );
        let c = RouterCollector::new(
            client.clone(),
            Duration::from_secs(5),
            ExporterMetrics::unregistered(),
        );

        c.collect().await.unwrap();

        let queried = client.queried.lock().clone();
        assert!(!queried.iter().any(|q| q == Entity::Link.entity_type()));
    }

    #[tokio::test]
    async fn test_router_failure_keeps_link_metrics() {
        let client = healthy_client().failing(Entity::Router, || QueryError::Status {
            code: 500,
            description: "Internal Error".into(),
        });

        let families = collector(client).collect().await.unwrap();

        assert!(family(&families, "addrCount").samples.is_empty());
        assert_eq!(
            family(&families, "deliveryCount").sample(&["orders"]).unwrap().value,
            7
        );
    }

    #[tokio::test]
    async fn test_each_entity_queried_once() {
        let client = Arc::new(healthy_client());
        let c = RouterCollector::new(
            client.clone(),
            Duration::from_secs(5),
            ExporterMetrics::unregistered(),
        );

        c.collect().await.unwrap();

        let queried = client.queried.lock().clone();
        let expected: Vec<String> = Entity::ALL
            .iter()
            .map(|e| e.entity_type().to_string())
            .collect();
        assert_eq!(queried, expected);
    }

    #[tokio::test]
    async fn test_missing_label_attribute_yields_empty_label() {
        // No routerId column on the router entity.
        let client = healthy_client().entity(
            Entity::Router,
            &["connectionCount", "linkCount", "addrCount", "autoLinkCount", "linkRouteCount"],
            vec![vec![i(1), i(1), i(4), i(0), i(0)]],
        );

        let families = collector(client).collect().await.unwrap();

        assert_eq!(family(&families, "addrCount").sample(&[""]).unwrap().value, 4);
    }

    #[tokio::test]
    async fn test_null_owning_addr_yields_empty_label() {
        let client = healthy_client().entity(
            Entity::Link,
            LINK_COLUMNS,
            vec![link_row("c9", FieldValue::Null, 2)],
        );

        let families = collector(client).collect().await.unwrap();

        assert_eq!(family(&families, "deliveryCount").sample(&[""]).unwrap().value, 2);
        assert_eq!(
            family(&families, "linkCount").sample(&["", "", ""]).unwrap().value,
            1
        );
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let mut client = healthy_client();
        client.delay = Some(Duration::from_millis(200));
        let c = RouterCollector::new(
            Arc::new(client),
            Duration::from_millis(20),
            ExporterMetrics::unregistered(),
        );

        let families = c.collect().await.unwrap();

        assert!(families.iter().all(|f| f.samples.is_empty()));
        assert_eq!(c.metrics().fetch_failures(Entity::Router, "timeout"), 1);
        assert_eq!(c.metrics().fetch_failures(Entity::Connection, "timeout"), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_fails_pass() {
        let client = healthy_client()
            .failing(Entity::Link, || QueryError::Malformed("body is not a map".into()));

        let err = collector(client).collect().await.unwrap_err();

        assert!(matches!(err, CollectError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_missing_source_attribute_fails_pass() {
        let client = healthy_client().entity(
            Entity::Link,
            &[
                "identity",
                "connectionId",
                "unsettledCount",
                "deliveryCount",
                "releasedCount",
                "rejectedCount",
                "acceptedCount",
                "undeliveredCount",
                "capacity",
            ],
            vec![vec![t("l"), t("c1"), i(0), i(1), i(0), i(0), i(1), i(0), i(250)]],
        );

        let err = collector(client).collect().await.unwrap_err();

        assert!(matches!(err, CollectError::Schema(_)));
    }

    #[tokio::test]
    async fn test_missing_value_attribute_fails_pass() {
        let client = healthy_client().entity(
            Entity::Router,
            &["routerId", "connectionCount", "linkCount", "addrCount"],
            vec![vec![t("Router.A"), i(1), i(1), i(1)]],
        );

        let err = collector(client).collect().await.unwrap_err();

        match err {
            CollectError::MissingValue { metric, .. } => assert_eq!(metric, "autoLinkCount"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_non_numeric_value_fails_pass() {
        let client = healthy_client().entity(
            Entity::Router,
            ROUTER_COLUMNS,
            vec![vec![t("Router.A"), t("three"), i(5), i(2), i(0), i(1)]],
        );

        let err = collector(client).collect().await.unwrap_err();

        assert!(matches!(err, CollectError::NonNumeric { .. }));
    }

    #[tokio::test]
    async fn test_empty_entity_needs_no_value_column() {
        let client = healthy_client().entity(Entity::Router, &["routerId"], vec![]);

        let families = collector(client).collect().await.unwrap();

        assert!(family(&families, "addrCount").samples.is_empty());
    }

    #[tokio::test]
    async fn test_empty_link_reply_still_checks_join_schema() {
        let client = healthy_client().entity(Entity::Link, &["identity"], vec![]);

        let err = collector(client).collect().await.unwrap_err();

        assert!(matches!(err, CollectError::Schema(_)));
    }

    #[tokio::test]
    async fn test_unmatched_connection_leaves_container_empty() {
        let client =
            healthy_client().entity(Entity::Connection, &["identity", "container"], vec![]);

        let families = collector(client).collect().await.unwrap();

        assert_eq!(
            family(&families, "linkCount")
                .sample(&["", "orders", ""])
                .unwrap()
                .value,
            1
        );
    }

    #[test]
    fn test_label_tuple() {
        let row = vec![t("Router.A"), FieldValue::Null, i(4)];
        let labels = label_tuple(&row, &[Some(0), Some(1), None, Some(2)]);

        assert_eq!(labels, vec!["Router.A", "", "", "4"]);
    }
}
