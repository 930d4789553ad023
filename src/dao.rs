//! The upward query contract for one entity type.
//!
//! An [`EntityDao`] translates filters, sorts and fetch joins into backend queries, runs them
//! through the shape-checked executor and converts the rows back into entities, ids or values.
//! Apart from its metrics counters it holds no mutable state; paging sessions and cursors
//! borrow it.

use crate::backend::{Backend, ResultSet};
use crate::config::QueryConfig;
use crate::errors::QueryError;
use crate::model::{AttributeKind, PathResolver};
use crate::query::cursor::BatchCursor;
use crate::query::eval::Evaluator;
use crate::query::exec::{self, into_count, into_entities, into_ids, into_values};
use crate::query::fetch::FetchPlan;
use crate::query::paging::{
    DrivingQueryPager, OffsetPager, Page, PagingMode, check_page_size, select_mode,
};
use crate::query::predicate::SelectQuery;
use crate::query::render::{RenderedQuery, render};
use crate::query::telemetry::{MetricsSnapshot, QueryMetrics};
use crate::query::translate::QueryTranslator;
use crate::query::types::{FetchJoinInformation, Filter, PageRequest, SortDirection, SortOrders};
use crate::types::{Entity, EntityId};
use crate::value::sort_cmp;
use bson::Bson;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct EntityDao<B: Backend> {
    backend: Arc<B>,
    resolver: Arc<PathResolver>,
    translator: QueryTranslator,
    entity: String,
    metrics: QueryMetrics,
}

impl<B: Backend> EntityDao<B> {
    /// # Errors
    /// `UnknownEntity` when `entity` has no model.
    pub fn new(
        backend: Arc<B>,
        resolver: Arc<PathResolver>,
        entity: &str,
    ) -> Result<Self, QueryError> {
        resolver.registry().get(entity)?;
        let translator = QueryTranslator::new(Arc::clone(&resolver))
            .with_capabilities(backend.name(), |kind| backend.supports(kind));
        Ok(Self {
            backend,
            resolver,
            translator,
            entity: entity.to_string(),
            metrics: QueryMetrics::default(),
        })
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        self.resolver.config()
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// In-memory evaluation with the same path semantics as the translated queries.
    #[must_use]
    pub fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.resolver, &self.entity)
    }

    /// # Errors
    /// Unknown paths and paths that do not end in an association.
    pub fn fetch_plan(&self, joins: &[FetchJoinInformation]) -> Result<FetchPlan, QueryError> {
        FetchPlan::apply(&self.resolver, &self.entity, joins)
    }

    fn run(&self, query: &SelectQuery) -> Result<ResultSet, QueryError> {
        exec::execute(self.backend.as_ref(), query, &self.metrics, self.config().slow_query_ms)
    }

    /// Number of entities matching `filter`; `None` counts everything.
    ///
    /// # Errors
    /// Translation errors and backend failures.
    pub fn count(&self, filter: Option<&Filter>, distinct: bool) -> Result<u64, QueryError> {
        let q = self.translator.count_query(&self.entity, filter, distinct)?;
        into_count(self.run(&q)?)
    }

    /// # Errors
    /// Translation errors and backend failures.
    pub fn find(&self, filter: Option<&Filter>, sort: &SortOrders) -> Result<Vec<Entity>, QueryError> {
        let q = self.translator.fetch_query(&self.entity, filter, &FetchPlan::none(), sort, None, None)?;
        into_entities(self.run(&q)?)
    }

    /// Matching ids in sort order, at most `max_results` of them.
    ///
    /// # Errors
    /// Translation errors and backend failures.
    pub fn find_ids(
        &self,
        filter: Option<&Filter>,
        max_results: Option<usize>,
        sort: &SortOrders,
    ) -> Result<Vec<EntityId>, QueryError> {
        let q = self.translator.id_query(&self.entity, filter, sort, max_results)?;
        into_ids(self.run(&q)?)
    }

    /// One page of entities with `joins` loaded. Plans that fan out page through ids.
    ///
    /// # Errors
    /// A zero page size, translation errors, and backend failures.
    pub fn fetch(
        &self,
        filter: Option<&Filter>,
        request: &PageRequest,
        joins: &[FetchJoinInformation],
    ) -> Result<Vec<Entity>, QueryError> {
        check_page_size(request.page_size)?;
        let plan = self.fetch_plan(joins)?;
        self.fetch_with_plan(filter, request, &plan)
    }

    pub(crate) fn fetch_with_plan(
        &self,
        filter: Option<&Filter>,
        request: &PageRequest,
        plan: &FetchPlan,
    ) -> Result<Vec<Entity>, QueryError> {
        match self.mode(plan) {
            PagingMode::Offset => {
                let q = self.translator.fetch_query(
                    &self.entity,
                    filter,
                    plan,
                    &request.sort,
                    Some(request.offset()),
                    Some(request.page_size),
                )?;
                into_entities(self.run(&q)?)
            }
            PagingMode::DrivingQuery => {
                let cap = request.offset().saturating_add(request.page_size);
                let ids = self.find_ids(filter, Some(cap), &request.sort)?;
                let slice = ids.get(request.offset()..).unwrap_or_default();
                self.fetch_ids_in_order(slice, plan)
            }
        }
    }

    /// Like [`EntityDao::fetch`], with the paging mode and total count attached.
    ///
    /// # Errors
    /// A zero page size, translation errors, and backend failures.
    pub fn page(
        &self,
        filter: Option<&Filter>,
        request: &PageRequest,
        joins: &[FetchJoinInformation],
    ) -> Result<Page<Entity>, QueryError> {
        check_page_size(request.page_size)?;
        let plan = self.fetch_plan(joins)?;
        let items = self.fetch_with_plan(filter, request, &plan)?;
        let total = usize::try_from(self.count(filter, false)?).ok();
        Ok(Page {
            items,
            page_number: request.page_number,
            page_size: request.page_size,
            total,
            mode: self.mode(&plan),
        })
    }

    fn mode(&self, plan: &FetchPlan) -> PagingMode {
        select_mode(plan.needs_distinct(), self.config().prefer_driving_query)
    }

    /// # Errors
    /// Translation errors and backend failures. Absence is `Ok(None)`.
    pub fn fetch_by_id(
        &self,
        id: &EntityId,
        joins: &[FetchJoinInformation],
    ) -> Result<Option<Entity>, QueryError> {
        let plan = self.fetch_plan(joins)?;
        let q = self.translator.ids_fetch_query(&self.entity, &[id.to_bson()], &plan, &SortOrders::none())?;
        Ok(into_entities(self.run(&q)?)?.into_iter().next())
    }

    /// Entities for `ids`, in the order of `ids`. Duplicates appear once at their first
    /// position and unknown ids are skipped.
    ///
    /// A non-empty `sort` is the one exception: it is an explicit request for a different
    /// order, so the result follows the sort instead, merged in memory when the list spans
    /// several IN queries. `None` or an empty sort keeps the order of `ids`.
    ///
    /// # Errors
    /// Translation errors and backend failures.
    pub fn fetch_by_ids(
        &self,
        ids: &[EntityId],
        sort: Option<&SortOrders>,
        joins: &[FetchJoinInformation],
    ) -> Result<Vec<Entity>, QueryError> {
        let plan = self.fetch_plan(joins)?;
        match sort.filter(|s| !s.is_empty()) {
            None => self.fetch_ids_in_order(ids, &plan),
            Some(sort) => self.fetch_ids_sorted(ids, sort, &plan),
        }
    }

    fn chunk_size(&self) -> usize {
        self.config().max_in_parameters.max(1)
    }

    pub(crate) fn fetch_ids_in_order(
        &self,
        ids: &[EntityId],
        plan: &FetchPlan,
    ) -> Result<Vec<Entity>, QueryError> {
        let unique = dedupe(ids);
        let mut found: HashMap<EntityId, Entity> = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(self.chunk_size()) {
            let keys: Vec<Bson> = chunk.iter().map(EntityId::to_bson).collect();
            let q = self.translator.ids_fetch_query(&self.entity, &keys, plan, &SortOrders::none())?;
            for e in into_entities(self.run(&q)?)? {
                found.insert(e.id.clone(), e);
            }
        }
        Ok(unique.iter().filter_map(|id| found.remove(id)).collect())
    }

    fn fetch_ids_sorted(
        &self,
        ids: &[EntityId],
        sort: &SortOrders,
        plan: &FetchPlan,
    ) -> Result<Vec<Entity>, QueryError> {
        let unique = dedupe(ids);
        let chunks: Vec<&[EntityId]> = unique.chunks(self.chunk_size()).collect();
        let mut out = Vec::with_capacity(unique.len());
        for chunk in &chunks {
            let keys: Vec<Bson> = chunk.iter().map(EntityId::to_bson).collect();
            let q = self.translator.ids_fetch_query(&self.entity, &keys, plan, sort)?;
            out.extend(into_entities(self.run(&q)?)?);
        }
        if chunks.len() > 1 {
            let keys = self.sort_keys(sort)?;
            out.sort_by(|a, b| compare_by(&keys, a, b));
        }
        Ok(out)
    }

    fn sort_keys(&self, sort: &SortOrders) -> Result<Vec<SortKey>, QueryError> {
        let registry = self.resolver.registry();
        sort.iter()
            .map(|o| {
                let resolved = self.resolver.resolve(&self.entity, &o.property)?;
                let id_field = match &resolved.leaf().kind {
                    AttributeKind::ToOne { target } => Some(registry.get(target)?.id_field.clone()),
                    _ => None,
                };
                Ok::<_, QueryError>(SortKey {
                    path: resolved.path.clone(),
                    id_field,
                    direction: o.direction,
                })
            })
            .collect()
    }

    /// The single entity whose `property` equals `value`. When several match, the one with
    /// the lowest id is returned and a warning is logged.
    ///
    /// # Errors
    /// Translation errors and backend failures. Absence is `Ok(None)`.
    pub fn fetch_by_unique_property(
        &self,
        property: &str,
        value: impl Into<Bson>,
        case_sensitive: bool,
        joins: &[FetchJoinInformation],
    ) -> Result<Option<Entity>, QueryError> {
        let plan = self.fetch_plan(joins)?;
        let q =
            self.translator.unique_query(&self.entity, property, value.into(), case_sensitive, &plan)?;
        let mut found = into_entities(self.run(&q)?)?;
        if found.len() > 1 {
            log::warn!(
                "{}.{property} matched more than one entity; returning id {}",
                self.entity,
                found[0].id
            );
        }
        found.truncate(1);
        Ok(found.pop())
    }

    /// # Errors
    /// Translation errors and backend failures.
    pub fn find_distinct_values(
        &self,
        filter: Option<&Filter>,
        property: &str,
        sort: &SortOrders,
    ) -> Result<Vec<Bson>, QueryError> {
        let q = self.translator.distinct_values_query(&self.entity, filter, property, sort)?;
        into_values(self.run(&q)?)
    }

    /// Distinct values of an element-collection table, ascending. The table may belong to any
    /// registered entity type.
    ///
    /// # Errors
    /// `UnknownEntity` for an undeclared table, and backend failures.
    pub fn find_distinct_in_collection_table(
        &self,
        table: &str,
        property: &str,
    ) -> Result<Vec<Bson>, QueryError> {
        let q = self.translator.collection_table_query(table, property)?;
        into_values(self.run(&q)?)
    }

    /// # Errors
    /// Unknown join paths.
    pub fn driving_pager(
        &self,
        filter: Option<Filter>,
        sort: SortOrders,
        joins: &[FetchJoinInformation],
        max_results: Option<usize>,
    ) -> Result<DrivingQueryPager<'_, B>, QueryError> {
        DrivingQueryPager::new(self, filter, sort, joins, max_results)
    }

    /// # Errors
    /// Unknown join paths, and joins that need DISTINCT.
    pub fn offset_pager(
        &self,
        filter: Option<Filter>,
        joins: &[FetchJoinInformation],
    ) -> Result<OffsetPager<'_, B>, QueryError> {
        OffsetPager::new(self, filter, joins)
    }

    /// Every matching entity, loaded `batch_size` ids at a time. The id query runs up front;
    /// entity batches are fetched lazily as the cursor advances.
    ///
    /// # Errors
    /// A zero batch size, translation errors, and failures of the id query.
    pub fn iterate<'d>(
        &'d self,
        filter: Option<&Filter>,
        sort: &SortOrders,
        joins: &[FetchJoinInformation],
        batch_size: Option<usize>,
    ) -> Result<
        BatchCursor<Entity, impl FnMut(&[EntityId]) -> Result<Vec<Entity>, QueryError> + use<'d, B>>,
        QueryError,
    > {
        let batch_size = batch_size.unwrap_or(self.config().default_batch_size);
        let plan = self.fetch_plan(joins)?;
        let ids = self.find_ids(filter, None, sort)?;
        BatchCursor::new(ids, batch_size, move |chunk: &[EntityId]| {
            self.fetch_ids_in_order(chunk, &plan)
        })
    }

    /// The query `fetch` would run first for `request`, rendered with its parameters.
    ///
    /// # Errors
    /// Translation errors.
    pub fn explain(
        &self,
        filter: Option<&Filter>,
        request: &PageRequest,
        joins: &[FetchJoinInformation],
    ) -> Result<RenderedQuery, QueryError> {
        let plan = self.fetch_plan(joins)?;
        let q = match self.mode(&plan) {
            PagingMode::Offset => self.translator.fetch_query(
                &self.entity,
                filter,
                &plan,
                &request.sort,
                Some(request.offset()),
                Some(request.page_size),
            )?,
            PagingMode::DrivingQuery => self.translator.id_query(
                &self.entity,
                filter,
                &request.sort,
                Some(request.offset().saturating_add(request.page_size)),
            )?,
        };
        Ok(render(&q))
    }
}

struct SortKey {
    path: String,
    /// Set for to-one leaves, which order by the related key.
    id_field: Option<String>,
    direction: SortDirection,
}

fn dedupe(ids: &[EntityId]) -> Vec<EntityId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
}

fn sort_value<'e>(key: &SortKey, e: &'e Entity) -> Option<&'e Bson> {
    match (e.get_path(&key.path), &key.id_field) {
        (Some(Bson::Document(d)), Some(id_field)) => d.get(id_field),
        (v, _) => v,
    }
}

fn compare_by(keys: &[SortKey], a: &Entity, b: &Entity) -> Ordering {
    for key in keys {
        let ord = sort_cmp(sort_value(key, a), sort_value(key, b));
        let ord = match key.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
