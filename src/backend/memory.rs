//! In-memory reference backend.
//!
//! One table per entity type, keyed by id. Associations are stored normalized: a to-one
//! attribute holds the target id, a to-many attribute an array of target ids, and element
//! collections stay inline. Queries run the way a relational engine would: join rows are
//! generated first, the predicate is evaluated per row under three-valued logic, rows are
//! ordered, made distinct, windowed and finally projected.

use super::{Backend, BackendError, ResultSet};
use crate::errors::QueryError;
use crate::model::{AttributeKind, EntityModel, ModelRegistry};
use crate::query::predicate::{
    ColumnRef, Join, JoinTarget, Operand, Predicate, SelectQuery, Selection,
};
use crate::query::truth::{
    Truth, between_truth, compare_truth, in_truth, like_truth, member_truth, modulo_truth,
};
use crate::query::types::{CmpOp, FilterKind, JoinType, SortDirection};
use crate::types::{Entity, EntityId};
use crate::utils::json::json_value_to_bson_document;
use crate::value::{ValueKey, is_null, sort_cmp};
use bson::{Bson, Document as BsonDocument};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

type Table = BTreeMap<EntityId, BsonDocument>;
type Row = Vec<Option<Bson>>;

pub struct MemoryBackend {
    registry: Arc<ModelRegistry>,
    tables: RwLock<HashMap<String, Table>>,
    unsupported: HashSet<FilterKind>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry, tables: RwLock::new(HashMap::new()), unsupported: HashSet::new() }
    }

    /// Declares filter kinds this backend refuses, to exercise capability checks.
    #[must_use]
    pub fn with_unsupported(mut self, kinds: impl IntoIterator<Item = FilterKind>) -> Self {
        self.unsupported.extend(kinds);
        self
    }

    /// Stores `item` and every associated entity embedded in it as a nested document.
    ///
    /// # Errors
    /// Unknown entity types, and nested association documents without a usable id.
    pub fn insert(&self, entity: &str, item: Entity) -> Result<(), QueryError> {
        let model = self.registry.get(entity)?;
        let mut tables = self.tables.write();
        let mut doc = self.normalize(&mut tables, model, &item.data)?;
        doc.insert(model.id_field.clone(), item.id.to_bson());
        tables.entry(entity.to_string()).or_default().insert(item.id, doc);
        Ok(())
    }

    /// Loads a JSON object mapping entity names to arrays of documents. Returns the number
    /// of top-level documents stored.
    ///
    /// # Errors
    /// Malformed JSON, unknown entity types, and documents without an id.
    pub fn load_json(&self, json: &str) -> Result<usize, QueryError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Object(map) = value else {
            return Err(QueryError::validation("fixture must be a JSON object of entity arrays"));
        };
        let mut stored = 0;
        for (entity, docs) in map {
            let model = self.registry.get(&entity)?;
            let serde_json::Value::Array(docs) = docs else {
                return Err(QueryError::validation(format!("fixture `{entity}` is not an array")));
            };
            for doc in docs {
                let doc = json_value_to_bson_document(&doc)
                    .map_err(|e| QueryError::validation(format!("fixture `{entity}`: {e}")))?;
                let id = doc
                    .get(&model.id_field)
                    .and_then(EntityId::from_bson)
                    .ok_or_else(|| {
                        QueryError::validation(format!("fixture `{entity}` row without id"))
                    })?;
                self.insert(&entity, Entity::new(id, doc))?;
                stored += 1;
            }
        }
        Ok(stored)
    }

    #[must_use]
    pub fn len(&self, entity: &str) -> usize {
        self.tables.read().get(entity).map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    fn normalize(
        &self,
        tables: &mut HashMap<String, Table>,
        model: &EntityModel,
        doc: &BsonDocument,
    ) -> Result<BsonDocument, QueryError> {
        let mut out = BsonDocument::new();
        for (key, value) in doc {
            let stored = match (model.attribute(key), value) {
                (Some(AttributeKind::ToOne { target }), Bson::Document(d)) => {
                    self.store(tables, target, d)?.to_bson()
                }
                (Some(AttributeKind::ToMany { target }), Bson::Array(items)) => {
                    let mut ids = Vec::with_capacity(items.len());
                    for item in items {
                        ids.push(match item {
                            Bson::Document(d) => self.store(tables, target, d)?.to_bson(),
                            other => other.clone(),
                        });
                    }
                    Bson::Array(ids)
                }
                (Some(AttributeKind::Embedded { model: inner }), Bson::Document(d)) => {
                    let inner = self.registry.get(inner)?;
                    Bson::Document(self.normalize(tables, inner, d)?)
                }
                (_, other) => other.clone(),
            };
            out.insert(key.clone(), stored);
        }
        Ok(out)
    }

    fn store(
        &self,
        tables: &mut HashMap<String, Table>,
        entity: &str,
        doc: &BsonDocument,
    ) -> Result<EntityId, QueryError> {
        let model = self.registry.get(entity)?;
        let id = doc.get(&model.id_field).and_then(EntityId::from_bson).ok_or_else(|| {
            QueryError::validation(format!("nested {entity} document without `{}`", model.id_field))
        })?;
        let mut stored = self.normalize(tables, model, doc)?;
        stored.insert(model.id_field.clone(), id.to_bson());
        tables.entry(entity.to_string()).or_default().insert(id.clone(), stored);
        Ok(id)
    }

    fn check_supported(&self, p: &Predicate) -> Result<(), BackendError> {
        let kind = match p {
            Predicate::True | Predicate::False => return Ok(()),
            Predicate::Compare { .. } | Predicate::EqualFolded { .. } => FilterKind::Compare,
            Predicate::Like { .. } => FilterKind::Like,
            Predicate::Between { .. } => FilterKind::Between,
            Predicate::In { .. } => FilterKind::In,
            Predicate::MemberOf { .. } => FilterKind::Contains,
            Predicate::IsNull { .. } => FilterKind::IsNull,
            Predicate::Modulo { .. } => FilterKind::Modulo,
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                self.check_supported(a)?;
                self.check_supported(b)?;
                if matches!(p, Predicate::And(..)) { FilterKind::And } else { FilterKind::Or }
            }
            Predicate::Not(inner) => {
                self.check_supported(inner)?;
                FilterKind::Not
            }
        };
        if self.unsupported.contains(&kind) {
            return Err(BackendError::Rejected(format!("{kind} predicates are not supported")));
        }
        Ok(())
    }

    fn join_rows(
        &self,
        tables: &HashMap<String, Table>,
        rows: Vec<Row>,
        arity: usize,
        parent: usize,
        join: &Join,
    ) -> Vec<Row> {
        let empty = Table::new();
        let mut out = Vec::with_capacity(rows.len());
        let mut matched: HashSet<EntityId> = HashSet::new();
        let target_table = match &join.target {
            JoinTarget::Entity(t) => tables.get(t).unwrap_or(&empty),
            JoinTarget::Elements { .. } => &empty,
        };
        for row in rows {
            let raw = walk(row[parent].as_ref(), &join.attribute);
            let values: Vec<Bson> = match (&join.target, raw) {
                (JoinTarget::Elements { .. }, Some(Bson::Array(items))) => items.clone(),
                (JoinTarget::Entity(_), Some(Bson::Array(ids))) if join.multi => {
                    ids.iter().filter_map(|id| lookup(target_table, id, &mut matched)).collect()
                }
                (JoinTarget::Entity(_), Some(id)) if !join.multi => {
                    lookup(target_table, id, &mut matched).into_iter().collect()
                }
                _ => Vec::new(),
            };
            if values.is_empty() {
                if join.join_type == JoinType::Left {
                    let mut r = row;
                    r.push(None);
                    out.push(r);
                }
                continue;
            }
            for v in values {
                let mut r = row.clone();
                r.push(Some(v));
                out.push(r);
            }
        }
        if join.join_type == JoinType::Right {
            for (id, doc) in target_table {
                if !matched.contains(id) {
                    let mut r: Row = vec![None; arity];
                    r.push(Some(Bson::Document(doc.clone())));
                    out.push(r);
                }
            }
        }
        out
    }

    fn hydrate(&self, tables: &HashMap<String, Table>, value: &mut Bson, chain: &[&Join]) {
        let Some((step, rest)) = chain.split_first() else {
            return;
        };
        match value {
            Bson::Array(items) => {
                for item in items {
                    self.hydrate(tables, item, chain);
                }
            }
            Bson::Document(doc) => {
                let Some(slot) = field_mut(doc, &step.attribute) else {
                    return;
                };
                if let JoinTarget::Entity(t) = &step.target
                    && let Some(table) = tables.get(t)
                {
                    load(table, slot);
                }
                self.hydrate(tables, slot, rest);
            }
            _ => {}
        }
    }
}

fn lookup(table: &Table, id: &Bson, matched: &mut HashSet<EntityId>) -> Option<Bson> {
    let id = EntityId::from_bson(id)?;
    let doc = table.get(&id)?;
    matched.insert(id);
    Some(Bson::Document(doc.clone()))
}

fn load(table: &Table, slot: &mut Bson) {
    let resolve = |v: &Bson| EntityId::from_bson(v).and_then(|id| table.get(&id)).cloned();
    match slot {
        Bson::Array(items) => {
            for item in items.iter_mut() {
                if let Some(doc) = resolve(&*item) {
                    *item = Bson::Document(doc);
                }
            }
        }
        Bson::Document(_) | Bson::Null => {}
        other => {
            if let Some(doc) = resolve(&*other) {
                *other = Bson::Document(doc);
            }
        }
    }
}

fn walk<'r>(start: Option<&'r Bson>, field: &[String]) -> Option<&'r Bson> {
    let mut cur = start?;
    for name in field {
        match cur {
            Bson::Document(d) => cur = d.get(name)?,
            _ => return None,
        }
    }
    Some(cur)
}

fn field_mut<'d>(doc: &'d mut BsonDocument, path: &[String]) -> Option<&'d mut Bson> {
    let (last, init) = path.split_last()?;
    let mut cur = doc;
    for name in init {
        cur = match cur.get_mut(name)? {
            Bson::Document(d) => d,
            _ => return None,
        };
    }
    cur.get_mut(last)
}

struct RowScope<'q> {
    aliases: HashMap<&'q str, usize>,
}

impl RowScope<'_> {
    fn value<'r>(&self, row: &'r Row, column: &ColumnRef) -> Option<&'r Bson> {
        let idx = *self.aliases.get(column.alias.as_str())?;
        walk(row.get(idx)?.as_ref(), &column.field)
    }

    fn truth(&self, p: &Predicate, row: &Row) -> Result<Truth, BackendError> {
        let null = Bson::Null;
        let get = |c: &ColumnRef| self.value(row, c).unwrap_or(&null);
        Ok(match p {
            Predicate::True => Truth::True,
            Predicate::False => Truth::False,
            Predicate::Compare { column, op, value } => compare_truth(*op, get(column), value),
            Predicate::EqualFolded { column, value } => match get(column) {
                Bson::String(s) => Truth::from_bool(s.to_lowercase() == value.to_lowercase()),
                other => compare_truth(CmpOp::Equal, other, &Bson::String(value.clone())),
            },
            Predicate::Like { column, pattern, case_sensitive } => {
                like_truth(get(column), pattern, *case_sensitive)
            }
            Predicate::Between { column, start, end } => between_truth(get(column), start, end),
            Predicate::In { column, values } => in_truth(get(column), values),
            Predicate::MemberOf { column, value } => member_truth(get(column), value, None),
            Predicate::IsNull { column } => Truth::from_bool(is_null(self.value(row, column))),
            Predicate::Modulo { column, divisor, remainder } => {
                let d = match divisor {
                    Operand::Value(v) => v,
                    Operand::Column(c) => get(c),
                };
                modulo_truth(get(column), d, *remainder).map_err(|e| match e {
                    QueryError::Validation(msg) => BackendError::InvalidValue(msg),
                    other => BackendError::Execution(other.to_string()),
                })?
            }
            Predicate::And(a, b) => self.truth(a, row)?.and(self.truth(b, row)?),
            Predicate::Or(a, b) => self.truth(a, row)?.or(self.truth(b, row)?),
            Predicate::Not(inner) => self.truth(inner, row)?.not(),
        })
    }
}

fn window<T>(items: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    items.into_iter().skip(offset.unwrap_or(0)).take(limit.unwrap_or(usize::MAX)).collect()
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, kind: FilterKind) -> bool {
        !self.unsupported.contains(&kind)
    }

    fn execute(&self, q: &SelectQuery) -> Result<ResultSet, BackendError> {
        if self.registry.get(&q.entity).is_err() {
            return Err(BackendError::Rejected(format!("unknown entity {}", q.entity)));
        }
        self.check_supported(&q.predicate)?;
        let tables = self.tables.read();
        let empty = Table::new();
        let root = tables.get(&q.entity).unwrap_or(&empty);

        let mut scope = RowScope { aliases: HashMap::new() };
        scope.aliases.insert(q.root_alias.as_str(), 0);
        let mut rows: Vec<Row> =
            root.values().map(|doc| vec![Some(Bson::Document(doc.clone()))]).collect();
        for (i, join) in q.joins.iter().enumerate() {
            let parent = *scope.aliases.get(join.parent.as_str()).ok_or_else(|| {
                BackendError::Rejected(format!("join {} references unknown alias {}", join.alias, join.parent))
            })?;
            rows = self.join_rows(&tables, rows, i + 1, parent, join);
            scope.aliases.insert(join.alias.as_str(), i + 1);
        }

        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if scope.truth(&q.predicate, &row)?.is_true() {
                kept.push(row);
            }
        }
        let mut rows = kept;

        if !q.order_by.is_empty() {
            rows.sort_by(|a, b| {
                q.order_by
                    .iter()
                    .map(|t| {
                        let o = sort_cmp(scope.value(a, &t.column), scope.value(b, &t.column));
                        if t.direction == SortDirection::Desc { o.reverse() } else { o }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let root_id = |row: &Row| -> Option<EntityId> {
            match row.first()? {
                Some(Bson::Document(d)) => d.get(&q.id_field).and_then(EntityId::from_bson),
                _ => None,
            }
        };

        Ok(match &q.selection {
            Selection::Count { distinct } => {
                let ids = rows.iter().filter_map(root_id);
                let n = if *distinct {
                    ids.collect::<HashSet<_>>().len()
                } else {
                    ids.count()
                };
                ResultSet::Count(n as u64)
            }
            Selection::Ids | Selection::Entity => {
                let mut seen = HashSet::new();
                let ids: Vec<EntityId> = rows
                    .iter()
                    .filter_map(root_id)
                    .filter(|id| !q.distinct || seen.insert(id.clone()))
                    .collect();
                let ids = window(ids, q.offset, q.limit);
                if q.selection == Selection::Ids {
                    ResultSet::Ids(ids)
                } else {
                    let chains: Vec<Vec<&Join>> =
                        q.fetch_joins().map(|j| chain(&q.joins, j)).collect();
                    let mut out = Vec::with_capacity(ids.len());
                    for id in ids {
                        let Some(doc) = root.get(&id) else { continue };
                        let mut value = Bson::Document(doc.clone());
                        for c in &chains {
                            self.hydrate(&tables, &mut value, c);
                        }
                        if let Bson::Document(data) = value {
                            out.push(Entity::new(id, data));
                        }
                    }
                    ResultSet::Entities(out)
                }
            }
            Selection::Values(columns) => {
                let mut seen = HashSet::new();
                let tuples: Vec<Vec<Bson>> = rows
                    .iter()
                    .map(|r| {
                        columns
                            .iter()
                            .map(|c| scope.value(r, c).cloned().unwrap_or(Bson::Null))
                            .collect::<Vec<_>>()
                    })
                    .filter(|t| {
                        !q.distinct || seen.insert(t.iter().map(ValueKey::from).collect::<Vec<_>>())
                    })
                    .collect();
                ResultSet::Values(window(tuples, q.offset, q.limit))
            }
        })
    }
}

/// Joins from the root down to `join`, outermost first.
fn chain<'q>(joins: &'q [Join], join: &'q Join) -> Vec<&'q Join> {
    let mut out = vec![join];
    let mut parent = join.parent.as_str();
    while let Some(p) = joins.iter().find(|j| j.alias == parent) {
        out.push(p);
        parent = p.parent.as_str();
    }
    out.reverse();
    out
}
