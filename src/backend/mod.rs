//! The storage side of the query contract.
//!
//! A backend receives fully translated [`SelectQuery`] values and returns rows in the shape
//! the query selected. It never sees a [`Filter`](crate::query::Filter).

pub mod memory;

use crate::query::predicate::SelectQuery;
use crate::query::types::FilterKind;
use crate::types::{Entity, EntityId};
use bson::Bson;
use thiserror::Error;

pub use memory::MemoryBackend;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("query rejected: {0}")]
    Rejected(String),

    #[error("query execution failed: {0}")]
    Execution(String),

    /// The query is well formed but a value met while executing it is not, such as a
    /// modulo divisor column holding zero. Surfaces as [`QueryError::Validation`](crate::QueryError).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("unexpected result shape: expected {expected}, got {actual}")]
    UnexpectedResult { expected: &'static str, actual: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    Count(u64),
    Ids(Vec<EntityId>),
    Entities(Vec<Entity>),
    /// One row per projected tuple.
    Values(Vec<Vec<Bson>>),
}

impl ResultSet {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Count(_) => "count",
            Self::Ids(_) => "ids",
            Self::Entities(_) => "entities",
            Self::Values(_) => "values",
        }
    }

    /// Rows returned; a count is a single row.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Count(_) => 1,
            Self::Ids(v) => v.len(),
            Self::Entities(v) => v.len(),
            Self::Values(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A storage collaborator able to execute translated queries.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend can execute predicates built from this filter kind.
    fn supports(&self, _kind: FilterKind) -> bool {
        true
    }

    /// # Errors
    /// Any rejection or failure of the query; callers propagate it unchanged.
    fn execute(&self, query: &SelectQuery) -> Result<ResultSet, BackendError>;
}
