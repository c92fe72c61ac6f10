//! Unified error type for the retrieval core.
//!
//! Context-build timeout is deliberately *not* a variant here: per design, a
//! deadline miss degrades to a partial result and a logged warning, it never
//! surfaces as `Err`.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Input(format!("non-serializable metadata: {err}"))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!(error = %err, "embedding provider HTTP error");
        Self::Embedding(err.to_string())
    }
}

impl From<surrealdb::Error> for CoreError {
    fn from(err: surrealdb::Error) -> Self {
        tracing::error!(error = %err, "storage error");
        Self::Storage(err.to_string())
    }
}
