use crate::backend::{QueryExecutor, QueryResult};
use crate::builder::Query;
use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for query execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Include the rendered query in fetch logs
    pub log_queries: bool,
    /// Maximum number of rows one fetch may materialize
    pub max_rows: Option<usize>,
    /// Ask for at most two rows in `fetch_one` when the query has no smaller limit
    pub probe_fetch_one: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            log_queries: false,
            max_rows: None,
            probe_fetch_one: true,
        }
    }
}

impl QueryConfig {
    /// Parse a config from JSON; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One page of results plus the total the page was cut from
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResults<R> {
    pub total: u64,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub results: Vec<R>,
}

impl<R> QueryResults<R> {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// QueryFactory runs built queries against an executor and maps their rows
pub struct QueryFactory<B: QueryExecutor> {
    backend: Arc<B>,
    config: QueryConfig,
}

impl<B: QueryExecutor> QueryFactory<B> {
    /// Create a new QueryFactory with the default config
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_config(backend, QueryConfig::default())
    }

    /// Create a new QueryFactory with custom config
    pub fn with_config(backend: Arc<B>, config: QueryConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Get the current configuration
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Check if backend is connected
    pub fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }

    async fn rows<R>(&self, operation: &'static str, query: &Query<R>) -> Result<QueryResult> {
        if self.config.log_queries {
            debug!(operation, query = %query, "fetch");
        }

        let rows = self.backend.execute(query.select_query()).await?;

        if let Some(limit) = self.config.max_rows {
            if rows.len() > limit {
                warn!(operation, limit, actual = rows.len(), "row cap exceeded");
                return Err(QueryError::ResultLimitExceeded {
                    limit,
                    actual: rows.len(),
                });
            }
        }

        debug!(operation, rows = rows.len(), "fetched");
        Ok(rows)
    }

    fn map<R>(query: &Query<R>, rows: &QueryResult) -> Result<Vec<R>> {
        rows.iter().map(|row| query.map_row(row)).collect()
    }

    /// Every matching row, in sort-key order
    pub async fn fetch_list<R>(&self, query: &Query<R>) -> Result<Vec<R>> {
        let rows = self.rows("fetch_list", query).await?;
        Self::map(query, &rows)
    }

    /// At most one row: `None` when nothing matches, an error when more than one does
    pub async fn fetch_one<R>(&self, query: &Query<R>) -> Result<Option<R>> {
        self.unique("fetch_one", query).await
    }

    /// Exactly one row
    pub async fn fetch_single<R>(&self, query: &Query<R>) -> Result<R> {
        self.unique("fetch_single", query)
            .await?
            .ok_or(QueryError::NoResult)
    }

    async fn unique<R>(&self, operation: &'static str, query: &Query<R>) -> Result<Option<R>> {
        let probe = match query.limit() {
            Some(limit) if limit <= 2 => None,
            _ if self.config.probe_fetch_one => Some(query.with_limit(2)),
            _ => None,
        };
        let rows = self.rows(operation, probe.as_ref().unwrap_or(query)).await?;

        if rows.len() > 1 {
            warn!(operation, count = rows.len(), "too many results");
            return Err(QueryError::TooManyResults { count: rows.len() });
        }

        rows.first().map(|row| query.map_row(row)).transpose()
    }

    /// First row of the query, if any
    pub async fn fetch_first<R>(&self, query: &Query<R>) -> Result<Option<R>> {
        let first = query.with_limit(1);
        self.unique("fetch_first", &first).await
    }

    /// Number of matching rows (or groups), ignoring offset and limit
    pub async fn fetch_count<R>(&self, query: &Query<R>) -> Result<u64> {
        let count = self.backend.execute_count(query.select_query()).await?;
        debug!(operation = "fetch_count", count, "counted");
        Ok(count)
    }

    /// One page of results together with the unpaged total
    pub async fn fetch_page<R>(&self, query: &Query<R>) -> Result<QueryResults<R>> {
        let total = self.fetch_count(query).await?;
        let results = self.fetch_list(query).await?;

        Ok(QueryResults {
            total,
            offset: query.offset(),
            limit: query.limit(),
            results,
        })
    }
}

impl<B: QueryExecutor> Clone for QueryFactory<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
        }
    }
}
