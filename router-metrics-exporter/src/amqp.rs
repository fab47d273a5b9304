//! AMQP 1.0 management client for the router's `$management` node.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::messaging::{AmqpValue, ApplicationProperties, Body, Message, Properties};
use fe2o3_amqp::types::primitives::{OrderedMap, SimpleValue, Value};
use fe2o3_amqp::{Connection, Delivery, Receiver, Sender, Session};
use tracing::{debug, trace};

use crate::config::ManagementConfig;
use crate::error::QueryError;
use crate::management::ManagementClient;
use crate::response::{FieldValue, Row, TabularResponse};

/// Management client that opens a fresh AMQP connection for every query.
pub struct AmqpManagementClient {
    url: String,
    container_id: String,
    node: String,
    next_reply: AtomicU64,
}

impl AmqpManagementClient {
    pub fn new(config: &ManagementConfig) -> Self {
        let url = if config.address.contains("://") {
            config.address.clone()
        } else {
            format!("amqp://{}", config.address)
        };

        Self {
            url,
            container_id: config.container_id.clone(),
            node: config.node.clone(),
            next_reply: AtomicU64::new(0),
        }
    }

    async fn query_on(
        &self,
        connection: &mut ConnectionHandle<()>,
        entity_type: &str,
    ) -> Result<TabularResponse, QueryError> {
        let mut session = Session::begin(connection)
            .await
            .map_err(|e| QueryError::Protocol(format!("session begin: {}", e)))?;

        let result = self.exchange(&mut session, entity_type).await;

        if let Err(e) = session.end().await {
            debug!(error = %e, "Failed to end management session");
        }
        result
    }

    async fn exchange(
        &self,
        session: &mut SessionHandle<()>,
        entity_type: &str,
    ) -> Result<TabularResponse, QueryError> {
        let seq = self.next_reply.fetch_add(1, Ordering::Relaxed);
        let reply_to = format!("{}-reply-{}", self.container_id, seq);

        let mut receiver =
            Receiver::attach(session, format!("{}-rx", reply_to), reply_to.as_str())
                .await
                .map_err(|e| QueryError::Protocol(format!("reply link attach: {}", e)))?;
        let attached =
            Sender::attach(session, format!("{}-tx", reply_to), self.node.as_str()).await;
        let mut sender = match attached {
            Ok(sender) => sender,
            Err(e) => {
                let _ = receiver.close().await;
                return Err(QueryError::Protocol(format!("request link attach: {}", e)));
            }
        };

        let result = request(&mut sender, &mut receiver, entity_type, &reply_to).await;

        if let Err(e) = sender.close().await {
            debug!(error = %e, "Failed to close request link");
        }
        if let Err(e) = receiver.close().await {
            debug!(error = %e, "Failed to close reply link");
        }
        result
    }
}

#[async_trait]
impl ManagementClient for AmqpManagementClient {
    async fn query(&self, entity_type: &str) -> Result<TabularResponse, QueryError> {
        let mut connection = Connection::open(self.container_id.as_str(), self.url.as_str())
            .await
            .map_err(|e| QueryError::Connect(format!("{}: {}", self.url, e)))?;

        let result = self.query_on(&mut connection, entity_type).await;

        if let Err(e) = connection.close().await {
            debug!(error = %e, "Failed to close management connection");
        }
        result
    }
}

/// Send one QUERY request and wait for its reply.
async fn request(
    sender: &mut Sender,
    receiver: &mut Receiver,
    entity_type: &str,
    reply_to: &str,
) -> Result<TabularResponse, QueryError> {
    let mut body = OrderedMap::new();
    body.insert(
        Value::String("attributeNames".to_string()),
        Value::List(Vec::new()),
    );

    let message = Message::builder()
        .properties(Properties::builder().reply_to(reply_to).build())
        .application_properties(
            ApplicationProperties::builder()
                .insert("operation", "QUERY")
                .insert("type", "org.amqp.management")
                .insert("entityType", entity_type)
                .insert("name", "self")
                .build(),
        )
        .value(Value::Map(body))
        .build();

    trace!(entity_type, reply_to, "Sending management query");
    sender
        .send(message)
        .await
        .map_err(|e| QueryError::Protocol(format!("send: {}", e)))?;

    let delivery: Delivery<Body<Value>> = receiver
        .recv()
        .await
        .map_err(|e| QueryError::Protocol(format!("receive: {}", e)))?;
    receiver
        .accept(&delivery)
        .await
        .map_err(|e| QueryError::Protocol(format!("accept: {}", e)))?;

    check_status(delivery.message().application_properties.as_ref())?;

    match delivery.body() {
        Body::Value(AmqpValue(value)) => parse_reply(value),
        _ => Err(QueryError::Malformed("reply body is not an AMQP value".into())),
    }
}

/// Management replies carry an HTTP-like `statusCode`.
fn check_status(properties: Option<&ApplicationProperties>) -> Result<(), QueryError> {
    let Some(properties) = properties else {
        return Ok(());
    };

    let code = match properties.0.get("statusCode") {
        Some(SimpleValue::Int(c)) => i64::from(*c),
        Some(SimpleValue::Long(c)) => *c,
        Some(SimpleValue::UInt(c)) => i64::from(*c),
        _ => return Ok(()),
    };
    if (200..300).contains(&code) {
        return Ok(());
    }

    let description = match properties.0.get("statusDescription") {
        Some(SimpleValue::String(s)) => s.clone(),
        _ => String::new(),
    };
    Err(QueryError::Status { code, description })
}

fn parse_reply(value: &Value) -> Result<TabularResponse, QueryError> {
    let Value::Map(map) = value else {
        return Err(QueryError::Malformed("reply body is not a map".into()));
    };

    let names = match map.get(&Value::String("attributeNames".to_string())) {
        Some(Value::List(names)) => names
            .iter()
            .map(|n| match n {
                Value::String(s) => Ok(s.clone()),
                other => Err(QueryError::Malformed(format!(
                    "attribute name is not a string: {:?}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(QueryError::Malformed("missing attributeNames".into())),
    };

    let rows = match map.get(&Value::String("results".to_string())) {
        Some(Value::List(rows)) => rows
            .iter()
            .map(|row| match row {
                Value::List(cells) => Ok(cells.iter().map(field_value).collect::<Row>()),
                other => Err(QueryError::Malformed(format!(
                    "result row is not a list: {:?}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
        _ => return Err(QueryError::Malformed("results is not a list".into())),
    };

    TabularResponse::new(names, rows)
}

fn field_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Byte(v) => FieldValue::Int(i64::from(*v)),
        Value::Short(v) => FieldValue::Int(i64::from(*v)),
        Value::Int(v) => FieldValue::Int(i64::from(*v)),
        Value::Long(v) => FieldValue::Int(*v),
        Value::UByte(v) => FieldValue::Int(i64::from(*v)),
        Value::UShort(v) => FieldValue::Int(i64::from(*v)),
        Value::UInt(v) => FieldValue::Int(i64::from(*v)),
        Value::ULong(v) => i64::try_from(*v)
            .map(FieldValue::Int)
            .unwrap_or(FieldValue::Float(*v as f64)),
        Value::Float(v) => FieldValue::Float(f64::from(v.into_inner())),
        Value::Double(v) => FieldValue::Float(v.into_inner()),
        Value::String(s) => FieldValue::Text(s.clone()),
        Value::Symbol(s) => FieldValue::Text(s.0.clone()),
        other => FieldValue::Text(format!("{:?}", other)),
    }
}
