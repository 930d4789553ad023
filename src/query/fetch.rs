//! Join bookkeeping and fetch plans.
//!
//! Every query owns one [`JoinTree`]. Fetch joins are applied first; filter and sort paths
//! then reuse a join whenever one already exists for the same path prefix, so a prefix is
//! never joined twice.

use super::predicate::{ColumnRef, Join, JoinTarget};
use super::types::{FetchJoinInformation, JoinType};
use crate::errors::QueryError;
use crate::model::{AttributeKind, PathResolver, ResolvedPath};
use std::collections::HashMap;

pub const ROOT_ALIAS: &str = "e";

#[derive(Debug, Clone)]
pub struct JoinTree {
    root_alias: String,
    joins: Vec<Join>,
    by_path: HashMap<String, usize>,
}

impl Default for JoinTree {
    fn default() -> Self {
        Self::new(ROOT_ALIAS)
    }
}

impl JoinTree {
    #[must_use]
    pub fn new(root_alias: &str) -> Self {
        Self { root_alias: root_alias.to_string(), joins: Vec::new(), by_path: HashMap::new() }
    }

    #[must_use]
    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    #[must_use]
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    #[must_use]
    pub fn into_joins(self) -> Vec<Join> {
        self.joins
    }

    /// Whether any join can multiply root rows.
    #[must_use]
    pub fn needs_distinct(&self) -> bool {
        self.joins.iter().any(|j| j.multi)
    }

    /// Makes sure a join exists for each of `points` (segment indices of `resolved`) and
    /// returns the alias of the last one together with the first segment after it.
    pub fn ensure(
        &mut self,
        resolved: &ResolvedPath,
        points: &[usize],
        join_type: JoinType,
        fetch: bool,
    ) -> (String, usize) {
        let mut parent = self.root_alias.clone();
        let mut from = 0;
        for &j in points {
            let path = resolved.prefix(j);
            let idx = match self.by_path.get(&path) {
                Some(&idx) => {
                    self.joins[idx].fetch |= fetch;
                    idx
                }
                None => {
                    let seg = &resolved.segments[j];
                    let target = match &seg.kind {
                        AttributeKind::ElementCollection { table, .. } => {
                            JoinTarget::Elements { table: table.clone() }
                        }
                        other => JoinTarget::Entity(other.target().unwrap_or_default().to_string()),
                    };
                    self.joins.push(Join {
                        path: path.clone(),
                        parent: parent.clone(),
                        attribute: resolved.segments[from..=j].iter().map(|s| s.name.clone()).collect(),
                        alias: format!("j{}", self.joins.len() + 1),
                        target,
                        join_type,
                        multi: seg.kind.is_multi_valued(),
                        fetch,
                    });
                    self.by_path.insert(path, self.joins.len() - 1);
                    self.joins.len() - 1
                }
            };
            parent = self.joins[idx].alias.clone();
            from = j + 1;
        }
        (parent, from)
    }

    /// Column for reading `resolved`, adding LEFT joins as needed. With `membership`, a
    /// collection-valued leaf is read whole instead of element by element.
    pub fn column(&mut self, resolved: &ResolvedPath, membership: bool) -> ColumnRef {
        let points = resolved.join_points(membership);
        let (alias, from) = self.ensure(resolved, &points, JoinType::Left, false);
        ColumnRef::new(alias, resolved.segments[from..].iter().map(|s| s.name.clone()).collect())
    }
}

/// Resolved fetch joins for one entity type.
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    tree: JoinTree,
    needs_distinct: bool,
}

impl FetchPlan {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Applies `joins` in order. Nested paths join every association along the way and
    /// shared prefixes resolve to one join.
    ///
    /// # Errors
    /// Unknown paths, and paths that do not end in an association or element collection.
    pub fn apply(
        resolver: &PathResolver,
        entity: &str,
        joins: &[FetchJoinInformation],
    ) -> Result<Self, QueryError> {
        let mut tree = JoinTree::default();
        for info in joins {
            let resolved = resolver.resolve(entity, &info.path)?;
            if !resolved.leaf().kind.is_joined() {
                return Err(QueryError::validation(format!(
                    "fetch join `{}` does not name an association",
                    info.path
                )));
            }
            let points: Vec<usize> = resolved
                .segments
                .iter()
                .enumerate()
                .filter(|(_, s)| s.kind.is_joined())
                .map(|(i, _)| i)
                .collect();
            tree.ensure(&resolved, &points, info.join_type, true);
        }
        let needs_distinct = tree.needs_distinct();
        Ok(Self { tree, needs_distinct })
    }

    /// True when a fetched association is multi-valued, so root rows fan out.
    #[must_use]
    pub fn needs_distinct(&self) -> bool {
        self.needs_distinct
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.joins().is_empty()
    }

    #[must_use]
    pub fn tree(&self) -> &JoinTree {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::model::{EntityModel, ModelRegistry};
    use std::sync::Arc;

    fn resolver() -> PathResolver {
        let reg = ModelRegistry::new()
            .with(
                EntityModel::new("Person")
                    .basic("name")
                    .to_one("address", "Address")
                    .to_many("orders", "Order")
                    .element_collection("tags", "person_tags"),
            )
            .with(EntityModel::new("Address").basic("city").to_one("country", "Country"))
            .with(EntityModel::new("Country").basic("code"))
            .with(EntityModel::new("Order").basic("total").to_many("lines", "Line"))
            .with(EntityModel::new("Line").basic("sku"));
        PathResolver::new(Arc::new(reg), Arc::new(QueryConfig::default()))
    }

    #[test]
    fn to_many_fetch_needs_distinct() {
        let r = resolver();
        let plan = FetchPlan::apply(&r, "Person", &[FetchJoinInformation::new("orders")]).unwrap();
        assert!(plan.needs_distinct());
        let plan = FetchPlan::apply(
            &r,
            "Person",
            &[FetchJoinInformation::new("address"), FetchJoinInformation::new("address.country")],
        )
        .unwrap();
        assert!(!plan.needs_distinct());
        assert!(!FetchPlan::none().needs_distinct());
    }

    #[test]
    fn shared_prefixes_join_once() {
        let r = resolver();
        let plan = FetchPlan::apply(
            &r,
            "Person",
            &[
                FetchJoinInformation::with_type("orders.lines", JoinType::Inner),
                FetchJoinInformation::new("orders"),
            ],
        )
        .unwrap();
        let paths: Vec<&str> = plan.tree().joins().iter().map(|j| j.path.as_str()).collect();
        assert_eq!(paths, vec!["orders", "orders.lines"]);
        assert_eq!(plan.tree().joins()[1].parent, "j1");
        assert_eq!(plan.tree().joins()[0].join_type, JoinType::Inner);
    }

    #[test]
    fn filter_columns_reuse_fetch_joins() {
        let r = resolver();
        let plan = FetchPlan::apply(&r, "Person", &[FetchJoinInformation::new("address")]).unwrap();
        let mut tree = plan.tree().clone();
        let city = tree.column(&r.resolve("Person", "address.city").unwrap(), false);
        assert_eq!(city, ColumnRef::new("j1", vec!["city".into()]));
        let tag = tree.column(&r.resolve("Person", "tags").unwrap(), false);
        assert_eq!(tag, ColumnRef::new("j2", vec![]));
        let whole = tree.column(&r.resolve("Person", "tags").unwrap(), true);
        assert_eq!(whole, ColumnRef::new("e", vec!["tags".into()]));
        assert_eq!(tree.joins().len(), 2);
        assert!(tree.needs_distinct());
    }

    #[test]
    fn basic_fetch_path_is_rejected() {
        let r = resolver();
        let err = FetchPlan::apply(&r, "Person", &[FetchJoinInformation::new("name")]).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }
}
