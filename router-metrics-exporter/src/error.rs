//! Error types for the router metrics exporter.

use thiserror::Error;

/// Failure of a single management query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The management endpoint could not be reached.
    #[error("Failed to connect to management endpoint: {0}")]
    Connect(String),

    /// The request did not complete within the configured timeout.
    #[error("Management query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Link-level failure while sending the request or awaiting the reply.
    #[error("Management protocol error: {0}")]
    Protocol(String),

    /// The management agent answered with a non-success status.
    #[error("Management query failed with status {code}: {description}")]
    Status { code: i64, description: String },

    /// The reply does not have the expected tabular shape.
    #[error("Malformed management response: {0}")]
    Malformed(String),
}

impl QueryError {
    /// Whether this failure should only drop the entity for the current cycle.
    ///
    /// Malformed replies break the fixed schema contract and fail the pass instead.
    pub fn is_transient(&self) -> bool {
        !matches!(self, QueryError::Malformed(_))
    }

    /// Short label used in logs and self-metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Connect(_) => "connect",
            QueryError::Timeout(_) => "timeout",
            QueryError::Protocol(_) => "protocol",
            QueryError::Status { .. } => "status",
            QueryError::Malformed(_) => "malformed",
        }
    }
}

/// Violation of the append-only tabular schema contract.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Attribute '{0}' is not present in the response")]
    MissingAttribute(String),

    #[error("Attribute '{0}' is already present in the response")]
    DuplicateAttribute(String),
}

/// Failure of a whole collection pass.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A metric's own value field is absent from an entity that answered.
    #[error("Entity '{entity}' has no value for metric '{metric}'")]
    MissingValue { metric: String, entity: String },

    /// A metric's value could not be read as an integer.
    #[error("Value '{value}' for metric '{metric}' is not numeric")]
    NonNumeric { metric: String, value: String },

    #[error("Entity '{entity}' returned an unusable response: {source}")]
    Malformed {
        entity: String,
        #[source]
        source: QueryError,
    },
}

/// Result type alias for collection passes.
pub type Result<T> = std::result::Result<T, CollectError>;
