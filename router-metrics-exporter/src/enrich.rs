//! Derived fields added to entity responses before accumulation.

use crate::error::SchemaError;
use crate::response::{FieldValue, TabularResponse};

/// Type prefix marking a mobile address (`M0orders`).
pub const MOBILE_ADDRESS_MARKER: char = 'M';

/// Strip the routing prefix from a router address.
///
/// Mobile addresses carry the marker plus a phase digit, so two characters
/// are removed; every other address loses its single class character.
/// Null passes through unchanged.
pub fn clean_address(address: &FieldValue) -> FieldValue {
    match address {
        FieldValue::Text(addr) => {
            let skip = if addr.starts_with(MOBILE_ADDRESS_MARKER) {
                2
            } else {
                1
            };
            FieldValue::Text(addr.chars().skip(skip).collect())
        }
        other => other.clone(),
    }
}

/// Find the container of the connection whose `identity` equals
/// `connection_id`. Returns null when nothing matches.
pub fn container_for_connection(
    connection_id: &FieldValue,
    connections: &TabularResponse,
) -> FieldValue {
    let (Some(id_idx), Some(container_idx)) = (
        connections.index_of("identity"),
        connections.index_of("container"),
    ) else {
        return FieldValue::Null;
    };

    connections
        .rows()
        .iter()
        .find(|row| &row[id_idx] == connection_id)
        .map(|row| row[container_idx].clone())
        .unwrap_or(FieldValue::Null)
}

/// Each connection row counts once toward `connectionCount`.
pub fn enrich_connections(connections: &mut TabularResponse) -> Result<(), SchemaError> {
    connections.add_constant_field("connectionCount", FieldValue::Int(1))
}

/// Add `address`, `linkCount` and `container` to link rows.
///
/// `container` is joined from `connections` on `connectionId` = `identity`.
pub fn enrich_links(
    links: &mut TabularResponse,
    connections: &TabularResponse,
) -> Result<(), SchemaError> {
    links.add_derived_field("address", "owningAddr", clean_address)?;
    links.add_constant_field("linkCount", FieldValue::Int(1))?;
    links.add_derived_field("container", "connectionId", |id| {
        container_for_connection(id, connections)
    })
}
