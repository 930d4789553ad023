use super::{AttributeKind, ModelRegistry};
use crate::config::QueryConfig;
use crate::errors::QueryError;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    /// Model the attribute was found on.
    pub owner: String,
    pub kind: AttributeKind,
}

/// A dotted property path resolved against the entity models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub entity: String,
    /// Stored path, after alias substitution.
    pub path: String,
    pub segments: Vec<PathSegment>,
}

impl ResolvedPath {
    #[must_use]
    pub fn leaf(&self) -> &PathSegment {
        // resolution never yields an empty segment list
        &self.segments[self.segments.len() - 1]
    }

    /// Whether following this path can bind more than one value per entity.
    #[must_use]
    pub fn crosses_multi_valued(&self) -> bool {
        self.segments.iter().any(|s| s.kind.is_multi_valued())
    }

    /// Segments that bind through a join. The leaf joins only when it is multi-valued and
    /// is read as a value; a membership test reads the whole collection instead.
    #[must_use]
    pub fn join_points(&self, membership: bool) -> Vec<usize> {
        let last = self.segments.len() - 1;
        self.segments
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                if *i < last { s.kind.is_joined() } else { !membership && s.kind.is_multi_valued() }
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Dotted prefix ending at segment `idx` (inclusive).
    #[must_use]
    pub fn prefix(&self, idx: usize) -> String {
        self.segments[..=idx].iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(".")
    }
}

/// Resolves dotted paths once per (entity, path) and caches the result.
pub struct PathResolver {
    registry: Arc<ModelRegistry>,
    config: Arc<QueryConfig>,
    cache: Mutex<LruCache<(String, String), Arc<ResolvedPath>>>,
}

impl PathResolver {
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>, config: Arc<QueryConfig>) -> Self {
        let cap = NonZeroUsize::new(config.path_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self { registry, config, cache: Mutex::new(LruCache::new(cap)) }
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// # Errors
    /// `Validation` for empty or too-deep paths, `UnknownEntity`/`UnknownProperty` when a
    /// segment cannot be found or cannot be traversed.
    pub fn resolve(&self, entity: &str, path: &str) -> Result<Arc<ResolvedPath>, QueryError> {
        let key = (entity.to_string(), path.to_string());
        if let Some(hit) = self.cache.lock().get(&key) {
            log::trace!("path cache hit: {entity}.{path}");
            return Ok(Arc::clone(hit));
        }
        let resolved = Arc::new(self.resolve_uncached(entity, path)?);
        self.cache.lock().put(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    fn resolve_uncached(&self, entity: &str, path: &str) -> Result<ResolvedPath, QueryError> {
        let stored = self.config.alias(path);
        if stored.is_empty() || stored.split('.').any(str::is_empty) {
            return Err(QueryError::validation(format!("malformed property path `{path}`")));
        }
        let depth = stored.split('.').count();
        if depth > self.config.max_path_depth {
            return Err(QueryError::validation(format!(
                "property path `{path}` exceeds maximum depth {}",
                self.config.max_path_depth
            )));
        }
        let unknown =
            || QueryError::UnknownProperty { entity: entity.to_string(), path: path.to_string() };

        let mut model = self.registry.get(entity)?;
        let mut segments = Vec::with_capacity(depth);
        for (i, name) in stored.split('.').enumerate() {
            let kind = model.attribute(name).ok_or_else(unknown)?.clone();
            let last = i + 1 == depth;
            let next = match &kind {
                AttributeKind::ToOne { target }
                | AttributeKind::ToMany { target }
                | AttributeKind::Embedded { model: target } => Some(target.clone()),
                AttributeKind::Basic | AttributeKind::ElementCollection { .. } => None,
            };
            segments.push(PathSegment { name: name.to_string(), owner: model.name.clone(), kind });
            if !last {
                let target = next.ok_or_else(unknown)?;
                model = self.registry.get(&target)?;
            }
        }
        Ok(ResolvedPath { entity: entity.to_string(), path: stored.to_string(), segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityModel;

    fn resolver(config: QueryConfig) -> PathResolver {
        let reg = ModelRegistry::new()
            .with(
                EntityModel::new("Person")
                    .basic("name")
                    .embedded("profile", "Profile")
                    .to_one("address", "Address")
                    .to_many("orders", "Order")
                    .element_collection("tags", "person_tags"),
            )
            .with(EntityModel::new("Profile").basic("nickname"))
            .with(EntityModel::new("Address").basic("city"))
            .with(EntityModel::new("Order").basic("total").to_one("owner", "Person"));
        PathResolver::new(Arc::new(reg), Arc::new(config))
    }

    #[test]
    fn resolves_nested_associations() {
        let r = resolver(QueryConfig::default());
        let p = r.resolve("Person", "orders.owner.address.city").unwrap();
        assert_eq!(p.segments.len(), 4);
        assert!(p.crosses_multi_valued());
        assert_eq!(p.leaf().owner, "Address");
        assert_eq!(p.prefix(1), "orders.owner");
        assert!(!r.resolve("Person", "profile.nickname").unwrap().crosses_multi_valued());
    }

    #[test]
    fn cached_paths_are_shared() {
        let r = resolver(QueryConfig::default());
        let a = r.resolve("Person", "address.city").unwrap();
        let b = r.resolve("Person", "address.city").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn rejects_bad_paths() {
        let r = resolver(QueryConfig { max_path_depth: 2, ..QueryConfig::default() });
        assert!(matches!(r.resolve("Person", "name.first"), Err(QueryError::UnknownProperty { .. })));
        assert!(matches!(r.resolve("Person", "nope"), Err(QueryError::UnknownProperty { .. })));
        assert!(matches!(r.resolve("Person", "a..b"), Err(QueryError::Validation(_))));
        assert!(matches!(r.resolve("Person", "orders.owner.name"), Err(QueryError::Validation(_))));
        assert!(matches!(r.resolve("Ghost", "x"), Err(QueryError::UnknownEntity(_))));
    }

    #[test]
    fn aliases_apply_before_resolution() {
        let r = resolver(QueryConfig::default().with_alias("town", "address.city"));
        let p = r.resolve("Person", "town").unwrap();
        assert_eq!(p.path, "address.city");
    }
}
