//! Tabular management query results.
//!
//! A management QUERY answers with an ordered list of attribute names and a
//! list of rows positionally aligned with them. [`TabularResponse`] keeps that
//! shape and only ever grows it by appending columns, so an index taken from
//! [`TabularResponse::index_of`] stays valid for the life of the response.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, SchemaError};

/// A single scalar cell of a management query row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Absent value.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Check if this value is absent.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Borrow the value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read the value as an integer.
    ///
    /// Floats are truncated toward zero and text is parsed. Returns `None`
    /// for null, non-finite floats and text that is not an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            FieldValue::Float(_) => None,
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Bool(b) => Some(i64::from(*b)),
            FieldValue::Null => None,
        }
    }

    /// Render the value as a label value. Null becomes the empty string.
    pub fn to_label(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// One row of a query result, aligned with the response's attribute names.
pub type Row = Vec<FieldValue>;

/// Ordered, duplicate-free attribute names of a response.
///
/// Names can only be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    names: Vec<String>,
}

impl Schema {
    /// Create a schema, rejecting duplicate names.
    pub fn new(names: Vec<String>) -> Result<Self, SchemaError> {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(SchemaError::DuplicateAttribute(name.clone()));
            }
        }
        Ok(Self { names })
    }

    /// Position of a named attribute.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// All attribute names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the schema has no attributes.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn append(&mut self, name: &str) -> Result<usize, SchemaError> {
        if self.index_of(name).is_some() {
            return Err(SchemaError::DuplicateAttribute(name.to_string()));
        }
        self.names.push(name.to_string());
        Ok(self.names.len() - 1)
    }
}

/// Raw reply body of a management QUERY.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReply {
    pub attribute_names: Vec<String>,
    #[serde(default)]
    pub results: Vec<Row>,
}

/// Result of one entity query, with attribute-indexed access.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularResponse {
    schema: Schema,
    rows: Vec<Row>,
}

impl TabularResponse {
    /// Wrap a query result.
    ///
    /// Fails if attribute names repeat or any row width differs from the
    /// number of attribute names.
    pub fn new(attribute_names: Vec<String>, rows: Vec<Row>) -> Result<Self, QueryError> {
        let schema =
            Schema::new(attribute_names).map_err(|e| QueryError::Malformed(e.to_string()))?;

        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != schema.len())
        {
            return Err(QueryError::Malformed(format!(
                "row {} has {} values for {} attributes",
                i,
                row.len(),
                schema.len()
            )));
        }

        Ok(Self { schema, rows })
    }

    /// Position of a named attribute, or `None` if the response lacks it.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    /// Attribute names in column order.
    pub fn attribute_names(&self) -> &[String] {
        self.schema.names()
    }

    /// All rows in response order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the response has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a named field in one of this response's rows.
    pub fn field<'a>(&self, row: &'a [FieldValue], name: &str) -> Option<&'a FieldValue> {
        self.index_of(name).and_then(|idx| row.get(idx))
    }

    /// Append a field holding the same value on every row.
    pub fn add_constant_field(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), SchemaError> {
        let value = value.into();
        self.schema.append(name)?;
        for row in &mut self.rows {
            row.push(value.clone());
        }
        Ok(())
    }

    /// Append a field computed from another field of the same row.
    ///
    /// The source attribute must exist; a missing source means the fixed
    /// metric catalog and the entity schema disagree.
    pub fn add_derived_field<F>(
        &mut self,
        name: &str,
        source: &str,
        mut transform: F,
    ) -> Result<(), SchemaError>
    where
        F: FnMut(&FieldValue) -> FieldValue,
    {
        let source_idx = self
            .index_of(source)
            .ok_or_else(|| SchemaError::MissingAttribute(source.to_string()))?;
        self.schema.append(name)?;

        for row in &mut self.rows {
            let derived = transform(&row[source_idx]);
            row.push(derived);
        }
        Ok(())
    }
}

impl TryFrom<QueryReply> for TabularResponse {
    type Error = QueryError;

    fn try_from(reply: QueryReply) -> Result<Self, Self::Error> {
        Self::new(reply.attribute_names, reply.results)
    }
}
