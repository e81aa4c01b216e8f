use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No result: query matched no rows")]
    NoResult,

    #[error("Too many results: expected at most one row, got {count}")]
    TooManyResults { count: usize },

    #[error("Invalid projection arity: constructor takes {expected} arguments, {actual} expressions supplied")]
    InvalidProjectionArity { expected: usize, actual: usize },

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Type mapping error: {0}")]
    TypeMapping(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Result limit exceeded: {actual} rows, limit is {limit}")]
    ResultLimitExceeded { limit: usize, actual: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
