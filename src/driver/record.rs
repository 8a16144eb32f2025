//! Result records and fully buffered results.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::{DriverError, DriverResult};
use super::summary::ResultSummary;
use super::types::{Node, Path, Relationship, Value};

// ============================================================================
// Record
// ============================================================================

/// One row of a result. Records of the same result share their key list.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    keys: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Fails when the server sent a different number of values than columns.
    pub fn new(keys: Arc<[String]>, values: Vec<Value>) -> DriverResult<Self> {
        if keys.len() != values.len() {
            return Err(DriverError::protocol(format!(
                "Record has {} values for {} columns",
                values.len(),
                keys.len()
            )));
        }
        Ok(Self { keys, values })
    }

    /// Column names, in the order the server returned them.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the column named `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }

    /// Value at a zero-based column position.
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Convert a column into `T`.
    ///
    /// A missing key or a value of another type is a `TypeConversion` error.
    pub fn get_as<T>(&self, key: &str) -> DriverResult<T>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        self.get(key)
            .cloned()
            .ok_or_else(|| DriverError::type_conversion(format!("Key '{}' not found", key)))
            .and_then(T::try_from)
    }

    /// Shorthand for `get_as::<bool>`; the other typed getters follow the same pattern.
    pub fn get_bool(&self, key: &str) -> DriverResult<bool> {
        self.get_as(key)
    }

    pub fn get_int(&self, key: &str) -> DriverResult<i64> {
        self.get_as(key)
    }

    pub fn get_float(&self, key: &str) -> DriverResult<f64> {
        self.get_as(key)
    }

    pub fn get_string(&self, key: &str) -> DriverResult<String> {
        self.get_as(key)
    }

    pub fn get_node(&self, key: &str) -> DriverResult<Node> {
        self.get_as(key)
    }

    pub fn get_relationship(&self, key: &str) -> DriverResult<Relationship> {
        self.get_as(key)
    }

    pub fn get_path(&self, key: &str) -> DriverResult<Path> {
        self.get_as(key)
    }

    /// Null and missing keys both read as `None`.
    pub fn get_optional<T>(&self, key: &str) -> DriverResult<Option<T>>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        match self.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(v) => T::try_from(v.clone()).map(Some),
        }
    }

    /// Copy the record into a key to value map.
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.keys
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .into_iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        write!(f, "{{{}}}", pairs.join(", "))
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::iter::Zip<std::slice::Iter<'a, String>, std::slice::Iter<'a, Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter().zip(self.values.iter())
    }
}

// ============================================================================
// QueryResult
// ============================================================================

/// Every record of one statement plus its summary.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub keys: Vec<String>,
    pub records: Vec<Record>,
    pub summary: ResultSummary,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// The only record; zero or several is an error.
    pub fn single(&self) -> DriverResult<&Record> {
        match self.records.as_slice() {
            [record] => Ok(record),
            records => Err(DriverError::invalid_state(format!(
                "Expected exactly one record, got {}",
                records.len()
            ))),
        }
    }
}

impl IntoIterator for QueryResult {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
