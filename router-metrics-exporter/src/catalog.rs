//! Fixed catalog of exported router metrics and the entities feeding them.

use std::collections::HashMap;
use std::fmt;

use crate::accumulator::{MetricAccumulator, MetricKind};

/// Label carrying the router identity.
pub const ROUTER_ID_LABEL: &str = "routerId";

/// Static description of one exported metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    /// Metric name, also the attribute holding its value.
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
    pub kind: MetricKind,
}

impl MetricSpec {
    const fn gauge(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            labels,
            kind: MetricKind::Gauge,
        }
    }

    const fn counter(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            labels,
            kind: MetricKind::Counter,
        }
    }

    /// Build a fresh, empty accumulator for this metric.
    pub fn accumulator(&self) -> MetricAccumulator {
        MetricAccumulator::new(
            self.name,
            self.help,
            self.labels.iter().map(|l| l.to_string()).collect(),
            self.kind,
        )
    }
}

/// All exported metrics, in exposition order.
pub const METRICS: &[MetricSpec] = &[
    MetricSpec::gauge(
        "connectionCount",
        "Number of connections to router",
        &[ROUTER_ID_LABEL, "container"],
    ),
    MetricSpec::gauge(
        "linkCount",
        "Number of links to router",
        &[ROUTER_ID_LABEL, "address", "container"],
    ),
    MetricSpec::gauge(
        "addrCount",
        "Number of addresses defined in router",
        &[ROUTER_ID_LABEL],
    ),
    MetricSpec::gauge(
        "autoLinkCount",
        "Number of auto links defined in router",
        &[ROUTER_ID_LABEL],
    ),
    MetricSpec::gauge(
        "linkRouteCount",
        "Number of link routers defined in router",
        &[ROUTER_ID_LABEL],
    ),
    MetricSpec::gauge(
        "unsettledCount",
        "Number of unsettled messages",
        &["address"],
    ),
    MetricSpec::counter(
        "deliveryCount",
        "Number of delivered messages",
        &["address"],
    ),
    MetricSpec::counter(
        "releasedCount",
        "Number of released messages",
        &["address"],
    ),
    MetricSpec::counter(
        "rejectedCount",
        "Number of rejected messages",
        &["address"],
    ),
    MetricSpec::counter(
        "acceptedCount",
        "Number of accepted messages",
        &["address"],
    ),
    MetricSpec::gauge(
        "undeliveredCount",
        "Number of undelivered messages",
        &["address"],
    ),
    MetricSpec::gauge("capacity", "Capacity of link", &["address"]),
];

/// Management entity types queried every collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// The router's own self-entity.
    Router,
    Connection,
    Link,
}

impl Entity {
    /// Fetch order within a pass. Connections precede links so the join can
    /// reuse the connection snapshot.
    pub const ALL: [Entity; 3] = [Entity::Router, Entity::Connection, Entity::Link];

    /// Management entity type name.
    pub fn entity_type(&self) -> &'static str {
        match self {
            Entity::Router => "org.apache.qpid.dispatch.router",
            Entity::Connection => "org.apache.qpid.dispatch.connection",
            Entity::Link => "org.apache.qpid.dispatch.router.link",
        }
    }

    /// Names of the metrics fed by this entity's rows.
    pub fn metrics(&self) -> &'static [&'static str] {
        match self {
            Entity::Router => &[
                "connectionCount",
                "linkCount",
                "addrCount",
                "autoLinkCount",
                "linkRouteCount",
            ],
            Entity::Connection => &["connectionCount"],
            Entity::Link => &[
                "linkCount",
                "unsettledCount",
                "deliveryCount",
                "releasedCount",
                "rejectedCount",
                "acceptedCount",
                "undeliveredCount",
                "capacity",
            ],
        }
    }

    /// Short name used in logs and self-metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Router => "router",
            Entity::Connection => "connection",
            Entity::Link => "link",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build one empty accumulator per catalog metric, keyed by metric name.
pub fn accumulators() -> HashMap<&'static str, MetricAccumulator> {
    METRICS.iter().map(|m| (m.name, m.accumulator())).collect()
}
