//! In-memory evaluation of filters against materialized entities.
//!
//! Evaluation follows the same row semantics as a translated query: every distinct path
//! prefix that crosses an association is bound once, to-many prefixes fan out into one
//! binding per element (a single NULL binding when empty), and the candidate matches when
//! any binding makes the whole filter TRUE under three-valued logic.

use super::truth::{
    Truth, between_truth, compare_truth, in_truth, like_truth, member_truth, modulo_truth,
};
use super::types::{Divisor, Filter};
use crate::errors::QueryError;
use crate::model::{AttributeKind, PathResolver, ResolvedPath};
use crate::types::Entity;
use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct JoinSpec {
    parent: Option<usize>,
    fields: Vec<String>,
    multi: bool,
}

/// A filter with all of its paths resolved, ready to test many candidates.
#[derive(Debug)]
pub struct CompiledFilter<'f> {
    filter: &'f Filter,
    paths: HashMap<&'f str, Arc<ResolvedPath>>,
    joins: Vec<JoinSpec>,
    join_index: HashMap<String, usize>,
    id_fields: HashMap<String, String>,
}

type Row<'c> = Vec<Option<&'c Bson>>;

/// Evaluates filters for one entity type.
pub struct Evaluator<'r> {
    resolver: &'r PathResolver,
    entity: String,
}

impl<'r> Evaluator<'r> {
    #[must_use]
    pub fn new(resolver: &'r PathResolver, entity: &str) -> Self {
        Self { resolver, entity: entity.to_string() }
    }

    /// # Errors
    /// Invalid trees, unknown properties, and `Contains` on a single-valued property.
    pub fn compile<'f>(&self, filter: &'f Filter) -> Result<CompiledFilter<'f>, QueryError> {
        filter.validate()?;
        let mut compiled = CompiledFilter {
            filter,
            paths: HashMap::new(),
            joins: Vec::new(),
            join_index: HashMap::new(),
            id_fields: HashMap::new(),
        };
        self.register(filter, &mut compiled)?;
        Ok(compiled)
    }

    /// # Errors
    /// See [`Evaluator::compile`]; also a divisor property that resolves to zero.
    pub fn matches(&self, filter: &Filter, candidate: &Entity) -> Result<bool, QueryError> {
        self.compile(filter)?.matches(candidate)
    }

    /// Keeps the candidates the filter matches, in their original order.
    ///
    /// # Errors
    /// See [`Evaluator::matches`].
    pub fn filter<'e>(
        &self,
        filter: &Filter,
        candidates: &'e [Entity],
    ) -> Result<Vec<&'e Entity>, QueryError> {
        let compiled = self.compile(filter)?;
        let mut out = Vec::new();
        for c in candidates {
            if compiled.matches(c)? {
                out.push(c);
            }
        }
        Ok(out)
    }

    fn register<'f>(
        &self,
        filter: &'f Filter,
        out: &mut CompiledFilter<'f>,
    ) -> Result<(), QueryError> {
        match filter {
            Filter::And(children) | Filter::Or(children) => {
                children.iter().try_for_each(|c| self.register(c, out))
            }
            Filter::Not(child) => self.register(child, out),
            Filter::Contains { path, .. } => {
                let resolved = self.use_path(path, true, out)?;
                let leaf = resolved.leaf();
                if !leaf.kind.is_multi_valued() {
                    return Err(QueryError::validation(format!(
                        "Contains requires a collection-valued property, `{path}` is not"
                    )));
                }
                Ok(())
            }
            Filter::Modulo { path, divisor, .. } => {
                self.use_path(path, false, out)?;
                if let Divisor::Property(p) = divisor {
                    self.use_path(p, false, out)?;
                }
                Ok(())
            }
            Filter::Compare { path, .. }
            | Filter::Like { path, .. }
            | Filter::Between { path, .. }
            | Filter::In { path, .. }
            | Filter::IsNull { path } => self.use_path(path, false, out).map(|_| ()),
        }
    }

    fn use_path<'f>(
        &self,
        path: &'f str,
        membership: bool,
        out: &mut CompiledFilter<'f>,
    ) -> Result<Arc<ResolvedPath>, QueryError> {
        let resolved = self.resolver.resolve(&self.entity, path)?;
        let mut parent = None;
        let mut from = 0;
        for j in resolved.join_points(membership) {
            let prefix = resolved.prefix(j);
            let idx = match out.join_index.get(&prefix) {
                Some(idx) => *idx,
                None => {
                    out.joins.push(JoinSpec {
                        parent,
                        fields: resolved.segments[from..=j].iter().map(|s| s.name.clone()).collect(),
                        multi: resolved.segments[j].kind.is_multi_valued(),
                    });
                    out.join_index.insert(prefix, out.joins.len() - 1);
                    out.joins.len() - 1
                }
            };
            parent = Some(idx);
            from = j + 1;
        }
        for seg in &resolved.segments {
            if let AttributeKind::ToOne { target } | AttributeKind::ToMany { target } = &seg.kind
                && !out.id_fields.contains_key(target)
            {
                let model = self.resolver.registry().get(target)?;
                out.id_fields.insert(target.clone(), model.id_field.clone());
            }
        }
        out.paths.insert(path, Arc::clone(&resolved));
        Ok(resolved)
    }
}

impl CompiledFilter<'_> {
    /// # Errors
    /// A divisor property that resolves to zero for an evaluated binding.
    pub fn matches(&self, candidate: &Entity) -> Result<bool, QueryError> {
        for row in self.bind(&candidate.data) {
            if self.truth(self.filter, &candidate.data, &row)?.is_true() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn bind<'c>(&self, root: &'c BsonDocument) -> Vec<Row<'c>> {
        let mut rows: Vec<Row<'c>> = vec![Vec::with_capacity(self.joins.len())];
        for spec in &self.joins {
            let mut next = Vec::with_capacity(rows.len());
            for row in rows {
                let value = match spec.parent {
                    Some(p) => walk_value(row[p], &spec.fields),
                    None => walk_doc(root, &spec.fields),
                };
                match value {
                    Some(Bson::Array(items)) if spec.multi && !items.is_empty() => {
                        for item in items {
                            let mut r = row.clone();
                            r.push(Some(item));
                            next.push(r);
                        }
                    }
                    Some(Bson::Array(_)) if spec.multi => {
                        let mut r = row;
                        r.push(None);
                        next.push(r);
                    }
                    other => {
                        let mut r = row;
                        r.push(other);
                        next.push(r);
                    }
                }
            }
            rows = next;
        }
        rows
    }

    fn lookup<'c>(
        &self,
        path: &str,
        membership: bool,
        root: &'c BsonDocument,
        row: &Row<'c>,
    ) -> Option<&'c Bson> {
        let resolved = self.paths.get(path)?;
        let joins = resolved.join_points(membership);
        let value = match joins.last() {
            Some(&j) => {
                let idx = *self.join_index.get(&resolved.prefix(j))?;
                let names: Vec<String> =
                    resolved.segments[j + 1..].iter().map(|s| s.name.clone()).collect();
                walk_value(row[idx], &names)
            }
            None => {
                let names: Vec<String> = resolved.segments.iter().map(|s| s.name.clone()).collect();
                walk_doc(root, &names)
            }
        }?;
        match (&resolved.leaf().kind, value, membership) {
            (AttributeKind::ToOne { target }, Bson::Document(d), false) => {
                d.get(self.id_fields.get(target)?)
            }
            _ => Some(value),
        }
    }

    fn truth<'c>(
        &self,
        filter: &Filter,
        root: &'c BsonDocument,
        row: &Row<'c>,
    ) -> Result<Truth, QueryError> {
        let null = Bson::Null;
        let value = |path: &str| self.lookup(path, false, root, row).unwrap_or(&null);
        Ok(match filter {
            Filter::Compare { op, path, value: bound } => compare_truth(*op, value(path), bound),
            Filter::Like { path, pattern, case_sensitive } => {
                like_truth(value(path), pattern, *case_sensitive)
            }
            Filter::Between { path, start, end } => between_truth(value(path), start, end),
            Filter::In { path, values } => in_truth(value(path), values),
            Filter::IsNull { path } => {
                Truth::from_bool(crate::value::is_null(self.lookup(path, false, root, row)))
            }
            Filter::Contains { path, value: needle } => {
                let coll = self.lookup(path, true, root, row).unwrap_or(&null);
                let id_field = self.paths.get(path.as_str()).and_then(|p| match &p.leaf().kind {
                    AttributeKind::ToMany { target } => self.id_fields.get(target).map(String::as_str),
                    _ => None,
                });
                member_truth(coll, needle, id_field)
            }
            Filter::Modulo { path, divisor, remainder } => {
                let d = match divisor {
                    Divisor::Literal(d) => Bson::Int64(*d),
                    Divisor::Property(p) => value(p).clone(),
                };
                modulo_truth(value(path), &d, *remainder)?
            }
            Filter::And(children) => {
                let mut acc = Truth::True;
                for c in children {
                    acc = acc.and(self.truth(c, root, row)?);
                }
                acc
            }
            Filter::Or(children) => {
                let mut acc = Truth::False;
                for c in children {
                    acc = acc.or(self.truth(c, root, row)?);
                }
                acc
            }
            Filter::Not(child) => self.truth(child, root, row)?.not(),
        })
    }
}

fn walk_doc<'c>(doc: &'c BsonDocument, names: &[String]) -> Option<&'c Bson> {
    let (first, rest) = names.split_first()?;
    walk_value(doc.get(first), rest)
}

fn walk_value<'c>(start: Option<&'c Bson>, names: &[String]) -> Option<&'c Bson> {
    let mut cur = start?;
    for name in names {
        match cur {
            Bson::Document(d) => cur = d.get(name)?,
            _ => return None,
        }
    }
    Some(cur)
}

/// Evaluates `filter` against one materialized entity of type `entity`.
///
/// # Errors
/// See [`Evaluator::matches`].
pub fn eval_filter(
    resolver: &PathResolver,
    entity: &str,
    candidate: &Entity,
    filter: &Filter,
) -> Result<bool, QueryError> {
    Evaluator::new(resolver, entity).matches(filter, candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::model::{EntityModel, ModelRegistry};
    use bson::doc;

    fn resolver() -> PathResolver {
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
            .with(EntityModel::new("Order").basic("total").basic("status"));
        PathResolver::new(Arc::new(reg), Arc::new(QueryConfig::default()))
    }

    fn person() -> Entity {
        Entity::new(
            1,
            doc! {
                "id": 1_i64, "name": "Ann", "age": 40,
                "address": {"id": 9_i64, "city": "Delft"},
                "orders": [
                    {"id": 10_i64, "total": 5, "status": "open"},
                    {"id": 11_i64, "total": 50, "status": "closed"},
                ],
                "tags": ["vip", "new"],
            },
        )
    }

    #[test]
    fn compound_to_many_conditions_bind_the_same_child() {
        let r = resolver();
        let ev = Evaluator::new(&r, "Person");
        let same = Filter::and(vec![
            Filter::gt("orders.total", 10),
            Filter::eq("orders.status", "closed"),
        ])
        .unwrap();
        let crossed =
            Filter::and(vec![Filter::gt("orders.total", 10), Filter::eq("orders.status", "open")])
                .unwrap();
        assert!(ev.matches(&same, &person()).unwrap());
        assert!(!ev.matches(&crossed, &person()).unwrap());
    }

    #[test]
    fn nulls_are_unknown_under_negation() {
        let r = resolver();
        let ev = Evaluator::new(&r, "Person");
        let p = Entity::new(2, doc! {"id": 2_i64, "name": "Bo"});
        assert!(!ev.matches(&Filter::eq("age", 3), &p).unwrap());
        assert!(!ev.matches(&Filter::negate(Filter::eq("age", 3)), &p).unwrap());
        assert!(ev.matches(&Filter::is_null("address.city"), &p).unwrap());
        assert!(ev.matches(&Filter::negate(Filter::in_values::<i32>("age", [])), &p).unwrap());
    }

    #[test]
    fn membership_and_element_values() {
        let r = resolver();
        let ev = Evaluator::new(&r, "Person");
        assert!(ev.matches(&Filter::contains("tags", "vip"), &person()).unwrap());
        assert!(ev.matches(&Filter::contains("orders", 11_i64), &person()).unwrap());
        assert!(!ev.matches(&Filter::contains("orders", 12_i64), &person()).unwrap());
        assert!(ev.matches(&Filter::eq("tags", "new"), &person()).unwrap());
        assert!(ev.matches(&Filter::eq("address", 9_i64), &person()).unwrap());
        assert!(matches!(
            ev.matches(&Filter::contains("name", "A"), &person()),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn modulo_with_zero_property_divisor_errors() {
        let r = resolver();
        let ev = Evaluator::new(&r, "Person");
        let p = Entity::new(3, doc! {"id": 3_i64, "age": 7, "name": 0});
        let f = Filter::modulo("age", Divisor::Property("name".into()), 1).unwrap();
        assert!(ev.matches(&f, &p).is_err());
        let ok = Filter::modulo("age", Divisor::Literal(3), 1).unwrap();
        assert!(ev.matches(&ok, &p).unwrap());
    }
}
