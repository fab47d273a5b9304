//! Prometheus exporter for Qpid Dispatch router metrics.
//!
//! Each scrape runs one collection pass against the router's management
//! node and renders the result in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌─────────────────┐    ┌──────────────┐
//! │   Router     │───▶│ RouterCollector │───▶│  HttpServer  │
//! │ $management  │    │ (accumulators)  │    │  /metrics    │
//! └──────────────┘    └─────────────────┘    └──────────────┘
//! ```
//!
//! - The [`ManagementClient`] answers one QUERY per entity type
//! - Replies become [`TabularResponse`]s; links are joined to connections
//! - [`MetricAccumulator`]s sum values per label tuple
//! - [`exposition::render`] turns the snapshots into scrape text

pub mod accumulator;
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod catalog;
pub mod collector;
pub mod config;
pub mod enrich;
pub mod error;
pub mod exposition;
pub mod http;
pub mod management;
pub mod response;
pub mod telemetry;

pub use accumulator::{MetricAccumulator, MetricFamily, MetricKind, Sample};
#[cfg(feature = "amqp")]
pub use amqp::AmqpManagementClient;
pub use catalog::{Entity, MetricSpec};
pub use collector::RouterCollector;
pub use config::{ConfigError, ExporterConfig, ManagementConfig, PrometheusConfig};
pub use error::{CollectError, QueryError, SchemaError};
pub use http::HttpServer;
pub use management::ManagementClient;
pub use response::{FieldValue, Row, TabularResponse};
pub use telemetry::ExporterMetrics;
