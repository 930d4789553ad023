//! Backend-independent query layer for entity data access.
//!
//! Callers describe *what* they want with a [`Filter`](query::Filter) tree, a
//! [`SortOrders`](query::SortOrders) list and [`FetchJoinInformation`](query::FetchJoinInformation)
//! eager loads. An [`EntityDao`](dao::EntityDao) turns those into backend queries, picks a safe
//! paging strategy, and hands back entities, ids or projected values. The same filters can be
//! evaluated in memory with [`Evaluator`](query::Evaluator).

pub mod backend;
pub mod cli;
pub mod config;
pub mod dao;
pub mod errors;
pub mod model;
pub mod query;
pub mod types;
pub mod utils;
pub mod value;

pub use backend::{Backend, BackendError, MemoryBackend, ResultSet};
pub use config::QueryConfig;
pub use dao::EntityDao;
pub use errors::QueryError;
pub use model::{AttributeKind, EntityModel, ModelRegistry, PathResolver};
pub use types::{Entity, EntityId};

/// Initializes logging from `log4rs.yaml` when the file is present.
///
/// # Errors
/// Returns an error if the logging configuration exists but cannot be loaded.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    utils::logger::init()?;
    Ok(())
}
