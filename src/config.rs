//! Query layer configuration.
//!
//! A `QueryConfig` is built once and shared read-only (usually behind an `Arc`) by the path
//! resolver, the translator and every DAO. Nothing in the crate mutates it after construction.

use crate::errors::QueryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Batch size used by bulk iteration when the caller does not pick one.
    pub default_batch_size: usize,
    /// Largest number of bound values in a single IN list.
    pub max_in_parameters: usize,
    pub max_path_depth: usize,
    pub path_cache_capacity: usize,
    pub slow_query_ms: u64,
    /// Use ID-driven paging even when the fetch plan does not require DISTINCT.
    pub prefer_driving_query: bool,
    /// Logical property path -> stored property path.
    pub property_aliases: BTreeMap<String, String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 500,
            max_in_parameters: 1000,
            max_path_depth: 32,
            path_cache_capacity: 256,
            slow_query_ms: 500,
            prefer_driving_query: false,
            property_aliases: BTreeMap::new(),
        }
    }
}

impl QueryConfig {
    /// # Errors
    /// Returns `QueryError::Config` when the TOML is malformed or a value is out of range.
    pub fn from_toml_str(s: &str) -> Result<Self, QueryError> {
        let cfg: Self = toml::from_str(s).map_err(|e| QueryError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or does not hold a valid configuration.
    pub fn from_path(path: &Path) -> Result<Self, QueryError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// # Errors
    /// Returns `QueryError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), QueryError> {
        let zero = [
            ("default_batch_size", self.default_batch_size),
            ("max_in_parameters", self.max_in_parameters),
            ("max_path_depth", self.max_path_depth),
            ("path_cache_capacity", self.path_cache_capacity),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);
        if let Some((name, _)) = zero {
            return Err(QueryError::Config(format!("{name} must be greater than zero")));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_alias(mut self, logical: impl Into<String>, stored: impl Into<String>) -> Self {
        self.property_aliases.insert(logical.into(), stored.into());
        self
    }

    #[must_use]
    pub fn alias<'a>(&'a self, path: &'a str) -> &'a str {
        self.property_aliases.get(path).map_or(path, String::as_str)
    }
}
