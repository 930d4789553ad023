//! Filter trees to backend queries.
//!
//! All five query shapes share one filter compilation: paths are resolved once, joins are
//! added to the query's [`JoinTree`] (reusing fetch joins), and combinators fold their
//! translated children pairwise.

use super::fetch::{FetchPlan, JoinTree};
use super::normalize::normalize_value;
use super::predicate::{
    ColumnRef, Join, JoinTarget, Operand, OrderTerm, Predicate, QueryShape, SelectQuery, Selection,
};
use super::types::{CmpOp, Divisor, Filter, FilterKind, JoinType, SortDirection, SortOrders};
use crate::errors::QueryError;
use crate::model::PathResolver;
use bson::Bson;
use std::collections::HashSet;
use std::sync::Arc;

pub struct QueryTranslator {
    resolver: Arc<PathResolver>,
    backend: String,
    unsupported: HashSet<FilterKind>,
}

impl QueryTranslator {
    #[must_use]
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self { resolver, backend: "generic".to_string(), unsupported: HashSet::new() }
    }

    /// Refuses the filter kinds a backend cannot execute.
    #[must_use]
    pub fn with_capabilities(
        mut self,
        backend: &str,
        supports: impl Fn(FilterKind) -> bool,
    ) -> Self {
        self.backend = backend.to_string();
        self.unsupported = FilterKind::ALL.into_iter().filter(|k| !supports(*k)).collect();
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Compiles `filter` against `tree`, adding the joins its paths need.
    ///
    /// # Errors
    /// Validation failures, unknown paths, and filter kinds the backend does not support.
    pub fn predicate(
        &self,
        entity: &str,
        filter: &Filter,
        tree: &mut JoinTree,
    ) -> Result<Predicate, QueryError> {
        filter.validate()?;
        self.translate(entity, filter, tree)
    }

    fn translate(
        &self,
        entity: &str,
        filter: &Filter,
        tree: &mut JoinTree,
    ) -> Result<Predicate, QueryError> {
        let kind = filter.kind();
        if self.unsupported.contains(&kind) {
            return Err(QueryError::UnsupportedFilter {
                kind: kind.as_str(),
                backend: self.backend.clone(),
            });
        }
        let mut column = |path: &str, membership: bool| -> Result<ColumnRef, QueryError> {
            let resolved = self.resolver.resolve(entity, path)?;
            if membership && !resolved.leaf().kind.is_multi_valued() {
                return Err(QueryError::validation(format!(
                    "Contains requires a collection-valued property, `{path}` is not"
                )));
            }
            Ok(tree.column(&resolved, membership))
        };
        Ok(match filter {
            Filter::Compare { op, path, value } => {
                Predicate::Compare { column: column(path, false)?, op: *op, value: value.clone() }
            }
            Filter::Like { path, pattern, case_sensitive } => Predicate::Like {
                column: column(path, false)?,
                pattern: pattern.clone(),
                case_sensitive: *case_sensitive,
            },
            Filter::Between { path, start, end } => Predicate::Between {
                column: column(path, false)?,
                start: start.clone(),
                end: end.clone(),
            },
            Filter::In { path, values } => {
                let column = column(path, false)?;
                if values.is_empty() {
                    Predicate::False
                } else {
                    Predicate::In { column, values: values.clone() }
                }
            }
            Filter::Contains { path, value } => {
                Predicate::MemberOf { column: column(path, true)?, value: value.clone() }
            }
            Filter::IsNull { path } => Predicate::IsNull { column: column(path, false)? },
            Filter::Modulo { path, divisor, remainder } => {
                let target = column(path, false)?;
                let divisor = match divisor {
                    Divisor::Literal(d) => Operand::Value(Bson::Int64(*d)),
                    Divisor::Property(p) => Operand::Column(column(p, false)?),
                };
                Predicate::Modulo { column: target, divisor, remainder: *remainder }
            }
            Filter::And(children) => self.fold(entity, children, tree, Predicate::and)?,
            Filter::Or(children) => self.fold(entity, children, tree, Predicate::or)?,
            Filter::Not(child) => self.translate(entity, child, tree)?.negate(),
        })
    }

    fn fold(
        &self,
        entity: &str,
        children: &[Filter],
        tree: &mut JoinTree,
        combine: fn(Predicate, Predicate) -> Predicate,
    ) -> Result<Predicate, QueryError> {
        let parts = children
            .iter()
            .map(|c| self.translate(entity, c, tree))
            .collect::<Result<Vec<_>, _>>()?;
        parts
            .into_iter()
            .reduce(combine)
            .ok_or_else(|| QueryError::validation("combinator without children"))
    }

    fn order_terms(
        &self,
        entity: &str,
        sort: &SortOrders,
        tree: &mut JoinTree,
    ) -> Result<Vec<OrderTerm>, QueryError> {
        sort.iter()
            .map(|o| {
                let resolved = self.resolver.resolve(entity, &o.property)?;
                Ok(OrderTerm { column: tree.column(&resolved, false), direction: o.direction })
            })
            .collect()
    }

    fn filtered(
        &self,
        entity: &str,
        filter: Option<&Filter>,
        tree: &mut JoinTree,
    ) -> Result<Predicate, QueryError> {
        filter.map_or(Ok(Predicate::True), |f| self.predicate(entity, f, tree))
    }

    fn base(&self, shape: QueryShape, entity: &str, tree: JoinTree) -> Result<SelectQuery, QueryError> {
        let id_field = self.resolver.registry().get(entity)?.id_field.clone();
        Ok(SelectQuery {
            shape,
            entity: entity.to_string(),
            root_alias: tree.root_alias().to_string(),
            id_field,
            selection: Selection::Entity,
            joins: tree.into_joins(),
            predicate: Predicate::True,
            distinct: false,
            order_by: Vec::new(),
            offset: None,
            limit: None,
        })
    }

    /// Number of matching entities. A to-many filter join always counts distinct roots.
    ///
    /// # Errors
    /// See [`QueryTranslator::predicate`].
    pub fn count_query(
        &self,
        entity: &str,
        filter: Option<&Filter>,
        distinct: bool,
    ) -> Result<SelectQuery, QueryError> {
        let mut tree = JoinTree::default();
        let predicate = self.filtered(entity, filter, &mut tree)?;
        let distinct = distinct || tree.needs_distinct();
        let mut q = self.base(QueryShape::Count, entity, tree)?;
        q.selection = Selection::Count { distinct };
        q.predicate = predicate;
        Ok(q)
    }

    /// Primary keys of matching entities in sort order. Only joins required by the
    /// filter and the sort are added; fetch joins never apply here.
    ///
    /// # Errors
    /// See [`QueryTranslator::predicate`].
    pub fn id_query(
        &self,
        entity: &str,
        filter: Option<&Filter>,
        sort: &SortOrders,
        max_results: Option<usize>,
    ) -> Result<SelectQuery, QueryError> {
        let mut tree = JoinTree::default();
        let predicate = self.filtered(entity, filter, &mut tree)?;
        let order_by = self.order_terms(entity, sort, &mut tree)?;
        let distinct = tree.needs_distinct();
        let mut q = self.base(QueryShape::Ids, entity, tree)?;
        q.selection = Selection::Ids;
        q.predicate = predicate;
        q.order_by = order_by;
        q.distinct = distinct;
        q.limit = max_results;
        Ok(q)
    }

    /// Full entities with the fetch plan's joins loaded.
    ///
    /// # Errors
    /// See [`QueryTranslator::predicate`].
    pub fn fetch_query(
        &self,
        entity: &str,
        filter: Option<&Filter>,
        plan: &FetchPlan,
        sort: &SortOrders,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<SelectQuery, QueryError> {
        let mut tree = plan.tree().clone();
        let predicate = self.filtered(entity, filter, &mut tree)?;
        let order_by = self.order_terms(entity, sort, &mut tree)?;
        let distinct = plan.needs_distinct() || tree.needs_distinct();
        let mut q = self.base(QueryShape::Fetch, entity, tree)?;
        q.predicate = predicate;
        q.order_by = order_by;
        q.distinct = distinct;
        q.offset = offset;
        q.limit = limit;
        Ok(q)
    }

    /// Entities whose primary key is in `ids`. The caller restores input order.
    ///
    /// # Errors
    /// See [`QueryTranslator::predicate`].
    pub fn ids_fetch_query(
        &self,
        entity: &str,
        ids: &[Bson],
        plan: &FetchPlan,
        sort: &SortOrders,
    ) -> Result<SelectQuery, QueryError> {
        let id_field = self.resolver.registry().get(entity)?.id_field.clone();
        let filter = Filter::In { path: id_field, values: ids.to_vec() };
        self.fetch_query(entity, Some(&filter), plan, sort, None, None)
    }

    /// Equality lookup on one property, limited to two rows so ambiguity is detectable.
    /// Case-insensitive mode folds both sides of a string comparison to lower case.
    ///
    /// # Errors
    /// Unknown paths; `UnsupportedFilter` when the backend cannot compare.
    pub fn unique_query(
        &self,
        entity: &str,
        property: &str,
        value: Bson,
        case_sensitive: bool,
        plan: &FetchPlan,
    ) -> Result<SelectQuery, QueryError> {
        if self.unsupported.contains(&FilterKind::Compare) {
            return Err(QueryError::UnsupportedFilter {
                kind: FilterKind::Compare.as_str(),
                backend: self.backend.clone(),
            });
        }
        let mut tree = plan.tree().clone();
        let column = tree.column(&*self.resolver.resolve(entity, property)?, false);
        let predicate = match normalize_value(value) {
            Bson::String(s) if !case_sensitive => Predicate::EqualFolded { column, value: s },
            v => Predicate::Compare { column, op: CmpOp::Equal, value: v },
        };
        let distinct = tree.needs_distinct();
        let mut q = self.base(QueryShape::Unique, entity, tree)?;
        q.predicate = predicate;
        q.distinct = distinct;
        q.order_by = vec![OrderTerm {
            column: ColumnRef::new(q.root_alias.clone(), vec![q.id_field.clone()]),
            direction: SortDirection::Asc,
        }];
        q.limit = Some(2);
        Ok(q)
    }

    /// Distinct values of one non-key property across matching entities.
    ///
    /// # Errors
    /// See [`QueryTranslator::predicate`].
    pub fn distinct_values_query(
        &self,
        entity: &str,
        filter: Option<&Filter>,
        property: &str,
        sort: &SortOrders,
    ) -> Result<SelectQuery, QueryError> {
        let mut tree = JoinTree::default();
        let predicate = self.filtered(entity, filter, &mut tree)?;
        let column = tree.column(&*self.resolver.resolve(entity, property)?, false);
        let order_by = self.order_terms(entity, sort, &mut tree)?;
        let mut q = self.base(QueryShape::Distinct, entity, tree)?;
        q.selection = Selection::Values(vec![column]);
        q.predicate = predicate;
        q.order_by = order_by;
        q.distinct = true;
        Ok(q)
    }

    /// Distinct values stored in an element-collection table, in ascending order.
    /// `property` is the table's value column, or a field of embedded element values.
    ///
    /// # Errors
    /// `UnknownEntity` when no model declares the table.
    pub fn collection_table_query(
        &self,
        table: &str,
        property: &str,
    ) -> Result<SelectQuery, QueryError> {
        let registry = self.resolver.registry();
        let owner = registry
            .collection_table(table)
            .ok_or_else(|| QueryError::UnknownEntity(table.to_string()))?;
        let tree = JoinTree::default();
        let alias = "c".to_string();
        let field =
            if property == owner.value_column { Vec::new() } else { vec![property.to_string()] };
        let column = ColumnRef::new(alias.clone(), field);
        let join = Join {
            path: owner.attribute.clone(),
            parent: tree.root_alias().to_string(),
            attribute: vec![owner.attribute.clone()],
            alias,
            target: JoinTarget::Elements { table: table.to_string() },
            join_type: JoinType::Inner,
            multi: true,
            fetch: false,
        };
        let mut q = self.base(QueryShape::Distinct, &owner.owner, tree)?;
        q.joins.push(join);
        q.selection = Selection::Values(vec![column.clone()]);
        q.distinct = true;
        q.order_by = vec![OrderTerm { column, direction: SortDirection::Asc }];
        Ok(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::model::{EntityModel, ModelRegistry};
    use crate::query::types::FetchJoinInformation;

    fn translator() -> QueryTranslator {
        let reg = ModelRegistry::new()
            .with(
                EntityModel::new("Person")
                    .basic("name")
                    .basic("age")
                    .to_one("address", "Address")
                    .to_many("orders", "Order")
                    .element_collection("tags", "person_tags"),
            )
            .with(EntityModel::new("Address").basic("city"))
            .with(EntityModel::new("Order").basic("total"));
        QueryTranslator::new(Arc::new(PathResolver::new(
            Arc::new(reg),
            Arc::new(QueryConfig::default()),
        )))
    }

    #[test]
    fn empty_in_translates_to_false() {
        let t = translator();
        let q = t.count_query("Person", Some(&Filter::in_values::<i32>("age", [])), false).unwrap();
        assert_eq!(q.predicate, Predicate::False);
    }

    #[test]
    fn combinators_fold_pairwise() {
        let t = translator();
        let f = Filter::and(vec![
            Filter::eq("name", "a"),
            Filter::gt("age", 1),
            Filter::negate(Filter::is_null("address.city")),
        ])
        .unwrap();
        let q = t.count_query("Person", Some(&f), false).unwrap();
        let Predicate::And(left, right) = &q.predicate else { panic!("expected And") };
        assert!(matches!(**left, Predicate::And(..)));
        assert!(matches!(**right, Predicate::Not(_)));
        assert_eq!(q.joins.len(), 1);
        assert_eq!(q.joins[0].join_type, JoinType::Left);
        assert_eq!(q.selection, Selection::Count { distinct: false });
    }

    #[test]
    fn to_many_filter_makes_counts_and_ids_distinct() {
        let t = translator();
        let f = Filter::gt("orders.total", 10);
        let q = t.count_query("Person", Some(&f), false).unwrap();
        assert_eq!(q.selection, Selection::Count { distinct: true });
        let q = t.id_query("Person", Some(&f), &SortOrders::none(), Some(3)).unwrap();
        assert!(q.distinct);
        assert_eq!(q.limit, Some(3));
    }

    #[test]
    fn id_query_ignores_fetch_joins_but_fetch_honours_plan() {
        let t = translator();
        let plan =
            FetchPlan::apply(t.resolver(), "Person", &[FetchJoinInformation::new("orders")]).unwrap();
        let q = t.fetch_query("Person", None, &plan, &SortOrders::none(), Some(10), Some(5)).unwrap();
        assert!(q.distinct);
        assert_eq!(q.fetch_joins().count(), 1);
        let q = t.id_query("Person", None, &SortOrders::none(), None).unwrap();
        assert!(q.joins.is_empty());
        assert!(!q.distinct);
    }

    #[test]
    fn unique_lookup_folds_case_on_request() {
        let t = translator();
        let q = t
            .unique_query("Person", "name", Bson::String("Ann".into()), false, &FetchPlan::none())
            .unwrap();
        assert!(matches!(q.predicate, Predicate::EqualFolded { .. }));
        assert_eq!(q.limit, Some(2));
        let q = t
            .unique_query("Person", "name", Bson::String("Ann".into()), true, &FetchPlan::none())
            .unwrap();
        assert!(matches!(q.predicate, Predicate::Compare { op: CmpOp::Equal, .. }));
    }

    #[test]
    fn unsupported_kinds_are_named() {
        let t = translator().with_capabilities("kv", |k| k != FilterKind::Modulo);
        let f = Filter::or(vec![
            Filter::eq("name", "x"),
            Filter::modulo("age", Divisor::Literal(2), 0).unwrap(),
        ])
        .unwrap();
        match t.count_query("Person", Some(&f), false) {
            Err(QueryError::UnsupportedFilter { kind, backend }) => {
                assert_eq!(kind, "Modulo");
                assert_eq!(backend, "kv");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn collection_table_projection() {
        let t = translator();
        let q = t.collection_table_query("person_tags", "value").unwrap();
        assert_eq!(q.entity, "Person");
        assert_eq!(q.selection, Selection::Values(vec![ColumnRef::new("c", vec![])]));
        assert!(t.collection_table_query("nope", "value").is_err());
    }

    #[test]
    fn contains_needs_a_collection() {
        let t = translator();
        assert!(t.count_query("Person", Some(&Filter::contains("tags", "x")), false).is_ok());
        assert!(matches!(
            t.count_query("Person", Some(&Filter::contains("name", "x")), false),
            Err(QueryError::Validation(_))
        ));
    }
}
