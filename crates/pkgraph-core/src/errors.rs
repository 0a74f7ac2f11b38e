//! Error types for the package graph core.

/// Top-level error enum for the package graph core.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Node not found: {0}")]
    NodeNotFound(i64),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphError {
    /// Whether the error originated in the graph store. Store failures are
    /// fatal for the current run.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            GraphError::Store(_)
                | GraphError::NodeNotFound(_)
                | GraphError::Query(_)
                | GraphError::Sqlite(_)
                | GraphError::Json(_)
        )
    }
}

#[cfg(feature = "python")]
impl From<GraphError> for pyo3::PyErr {
    fn from(err: GraphError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};

        match &err {
            GraphError::Store(_)
            | GraphError::NodeNotFound(_)
            | GraphError::Sqlite(_)
            | GraphError::Pipeline(_) => PyRuntimeError::new_err(err.to_string()),
            GraphError::Query(_) | GraphError::Parse(_) | GraphError::Config(_) => {
                PyValueError::new_err(err.to_string())
            }
            GraphError::Io(_) => PyIOError::new_err(err.to_string()),
            GraphError::Json(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
