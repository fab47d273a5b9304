//! Client interface to the router's management node.

use async_trait::async_trait;

use crate::error::QueryError;
use crate::response::TabularResponse;

/// Management client interface.
///
/// One call performs one QUERY round-trip for every instance of an entity
/// type. Implementations own the connection for the duration of the call
/// only and release it on every exit path.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Query all attributes of every instance of `entity_type`.
    async fn query(&self, entity_type: &str) -> Result<TabularResponse, QueryError>;
}

