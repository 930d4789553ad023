//! Runs translated queries against a backend and checks the result shape.

use super::predicate::{SelectQuery, Selection};
use super::render::render;
use super::telemetry::{METRICS_TARGET, QueryMetrics};
use crate::backend::{Backend, BackendError, ResultSet};
use crate::errors::QueryError;
use crate::types::{Entity, EntityId};
use crate::utils::devlog::{self, QueryBench};
use bson::Bson;
use std::time::Instant;

/// Executes `query`, logging its text at DEBUG, timing it, and recording it in `metrics`.
/// Backend errors are counted and returned unchanged, except invalid values, which are
/// validation errors in both evaluation paths.
///
/// # Errors
/// Whatever the backend reports, and a result whose shape does not match the selection.
pub fn execute<B: Backend + ?Sized>(
    backend: &B,
    query: &SelectQuery,
    metrics: &QueryMetrics,
    slow_query_ms: u64,
) -> Result<ResultSet, QueryError> {
    if log::log_enabled!(log::Level::Debug) {
        let rendered = render(query);
        log::debug!(
            "{} {} on {}: {} {:?}",
            query.shape.as_str(),
            query.entity,
            backend.name(),
            rendered.text,
            rendered.params
        );
    }
    let start = Instant::now();
    let result = match backend.execute(query) {
        Ok(r) => r,
        Err(BackendError::InvalidValue(msg)) => {
            log::debug!("{} {} rejected a value: {msg}", query.shape.as_str(), query.entity);
            return Err(QueryError::Validation(msg));
        }
        Err(e) => {
            metrics.record_backend_error();
            log::debug!("{} {} failed: {e}", query.shape.as_str(), query.entity);
            return Err(e.into());
        }
    };
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    metrics.record(query.shape);
    devlog::emit(QueryBench {
        op: query.shape.as_str(),
        entity: query.entity.clone(),
        backend: backend.name().to_string(),
        duration_ms,
        result_count: result.len(),
    });
    if duration_ms >= slow_query_ms {
        metrics.record_slow();
        log::warn!(
            target: METRICS_TARGET,
            "{{\"event\":\"slow_query\",\"op\":\"{}\",\"entity\":\"{}\",\"duration_ms\":{}}}",
            query.shape.as_str(),
            query.entity,
            duration_ms
        );
    }
    check_shape(&query.selection, &result)?;
    Ok(result)
}

fn check_shape(selection: &Selection, result: &ResultSet) -> Result<(), QueryError> {
    let expected = match selection {
        Selection::Entity => "entities",
        Selection::Count { .. } => "count",
        Selection::Ids => "ids",
        Selection::Values(_) => "values",
    };
    if result.kind() == expected {
        Ok(())
    } else {
        Err(BackendError::UnexpectedResult { expected, actual: result.kind() }.into())
    }
}

fn unexpected(expected: &'static str, got: &ResultSet) -> QueryError {
    BackendError::UnexpectedResult { expected, actual: got.kind() }.into()
}

/// # Errors
/// Any other result shape.
pub fn into_count(r: ResultSet) -> Result<u64, QueryError> {
    match r {
        ResultSet::Count(n) => Ok(n),
        other => Err(unexpected("count", &other)),
    }
}

/// # Errors
/// Any other result shape.
pub fn into_ids(r: ResultSet) -> Result<Vec<EntityId>, QueryError> {
    match r {
        ResultSet::Ids(ids) => Ok(ids),
        other => Err(unexpected("ids", &other)),
    }
}

/// # Errors
/// Any other result shape.
pub fn into_entities(r: ResultSet) -> Result<Vec<Entity>, QueryError> {
    match r {
        ResultSet::Entities(es) => Ok(es),
        other => Err(unexpected("entities", &other)),
    }
}

/// First column of each projected row.
///
/// # Errors
/// Any other result shape.
pub fn into_values(r: ResultSet) -> Result<Vec<Bson>, QueryError> {
    match r {
        ResultSet::Values(rows) => {
            Ok(rows.into_iter().map(|row| row.into_iter().next().unwrap_or(Bson::Null)).collect())
        }
        other => Err(unexpected("values", &other)),
    }
}
