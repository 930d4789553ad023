use crate::backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported filter kind `{kind}` for backend {backend}")]
    UnsupportedFilter { kind: &'static str, backend: String },

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("Unknown property `{path}` on entity {entity}")]
    UnknownProperty { entity: String, path: String },

    #[error("Backend execution error: {0}")]
    Backend(#[from] BackendError),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl QueryError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<std::io::Error> for QueryError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
