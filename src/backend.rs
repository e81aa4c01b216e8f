use crate::builder::SelectQuery;
use crate::error::{QueryError, Result};
use crate::projection::FromColumn;
use async_trait::async_trait;
use serde_json::Value;

/// Row from a query result: named columns in projection order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRow {
    labels: Vec<String>,
    values: Vec<Value>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.labels.push(key);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// First column with this label
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|label| label == key)
            .map(|index| &self.values[index])
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.value(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_at<T>(&self, index: usize) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.value_at(index)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Typed read of one column, reporting why it failed
    pub fn column<T: FromColumn>(&self, index: usize) -> Result<T> {
        let value = self.value_at(index).ok_or_else(|| {
            QueryError::TypeMapping(format!(
                "row has {} columns, no column {}",
                self.len(),
                index
            ))
        })?;
        T::from_column(value)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.value(key)
            .and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.value(key).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(|v| v.as_bool())
    }

    /// Whether the column is null or missing
    pub fn is_null(&self, key: &str) -> bool {
        self.value(key).map_or(true, Value::is_null)
    }
}

/// Result of a query
pub type QueryResult = Vec<QueryRow>;

/// Storage engine the query core delegates to.
///
/// Implementations evaluate a validated [`SelectQuery`] and return its rows in
/// the requested order. Failures are reported as [`QueryError::Executor`] and are
/// never retried by the caller.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Rows of the query, honoring offset and limit
    async fn execute(&self, query: &SelectQuery) -> Result<QueryResult>;

    /// Number of rows the query matches, ignoring offset and limit
    async fn execute_count(&self, query: &SelectQuery) -> Result<u64>;

    /// Check if the executor can serve queries
    fn is_connected(&self) -> bool {
        true
    }
}
