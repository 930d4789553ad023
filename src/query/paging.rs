//! Page-at-a-time access to filtered entities.
//!
//! Two strategies exist. Offset paging pushes LIMIT/OFFSET into a single fetch query and is
//! only correct while root rows do not fan out. Driving-query paging first loads the ordered
//! id list once per session, then fetches each page by id and restores the list order.

use super::fetch::FetchPlan;
use super::types::{FetchJoinInformation, Filter, PageRequest, SortOrders};
use crate::backend::Backend;
use crate::dao::EntityDao;
use crate::errors::QueryError;
use crate::types::{Entity, EntityId};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingMode {
    Offset,
    DrivingQuery,
}

/// Offset paging combined with a fan-out join would apply DISTINCT after LIMIT, so a plan
/// that needs DISTINCT always pages through ids.
#[must_use]
pub fn select_mode(needs_distinct: bool, prefer_driving: bool) -> PagingMode {
    if needs_distinct || prefer_driving { PagingMode::DrivingQuery } else { PagingMode::Offset }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_number: usize,
    pub page_size: usize,
    /// Matching entities across all pages, when the pager knows it.
    pub total: Option<usize>,
    pub mode: PagingMode,
}

impl<T> Page<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether another page can follow this one. Unknown totals assume a full page means more.
    #[must_use]
    pub fn has_next(&self) -> bool {
        match self.total {
            Some(total) => self.page_number.saturating_add(1).saturating_mul(self.page_size) < total,
            None => self.items.len() == self.page_size,
        }
    }
}

pub(crate) fn check_page_size(size: usize) -> Result<(), QueryError> {
    if size == 0 {
        return Err(QueryError::validation("page size must be greater than zero"));
    }
    Ok(())
}

/// Single-query LIMIT/OFFSET paging.
pub struct OffsetPager<'d, B: Backend> {
    dao: &'d EntityDao<B>,
    filter: Option<Filter>,
    plan: FetchPlan,
}

impl<'d, B: Backend> OffsetPager<'d, B> {
    /// # Errors
    /// Unknown join paths, and any fetch join that makes root rows fan out.
    pub fn new(
        dao: &'d EntityDao<B>,
        filter: Option<Filter>,
        joins: &[FetchJoinInformation],
    ) -> Result<Self, QueryError> {
        let plan = dao.fetch_plan(joins)?;
        if plan.needs_distinct() {
            return Err(QueryError::validation(
                "offset paging cannot load to-many fetch joins; use driving-query paging",
            ));
        }
        Ok(Self { dao, filter, plan })
    }

    /// # Errors
    /// A zero page size, translation errors, and backend failures.
    pub fn page(&self, request: &PageRequest) -> Result<Page<Entity>, QueryError> {
        check_page_size(request.page_size)?;
        let items = self.dao.fetch_with_plan(self.filter.as_ref(), request, &self.plan)?;
        Ok(Page {
            items,
            page_number: request.page_number,
            page_size: request.page_size,
            total: None,
            mode: PagingMode::Offset,
        })
    }
}

/// ID-driven paging session.
///
/// The id query runs at most once per session; `set_filter`, `set_sort` and `refresh` drop
/// the cached list. A session belongs to one caller and is not meant to be shared.
pub struct DrivingQueryPager<'d, B: Backend> {
    dao: &'d EntityDao<B>,
    filter: Option<Filter>,
    sort: SortOrders,
    plan: FetchPlan,
    max_results: Option<usize>,
    ids: Option<Vec<EntityId>>,
    index: HashMap<EntityId, usize>,
}

impl<'d, B: Backend> DrivingQueryPager<'d, B> {
    /// # Errors
    /// Unknown join paths.
    pub fn new(
        dao: &'d EntityDao<B>,
        filter: Option<Filter>,
        sort: SortOrders,
        joins: &[FetchJoinInformation],
        max_results: Option<usize>,
    ) -> Result<Self, QueryError> {
        let plan = dao.fetch_plan(joins)?;
        Ok(Self { dao, filter, sort, plan, max_results, ids: None, index: HashMap::new() })
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.ids.is_some()
    }

    fn load(&mut self) -> Result<&[EntityId], QueryError> {
        if self.ids.is_none() {
            let ids = self.dao.find_ids(self.filter.as_ref(), self.max_results, &self.sort)?;
            self.index = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
            log::debug!("driving query for {} cached {} ids", self.dao.entity(), ids.len());
            self.ids = Some(ids);
        }
        Ok(self.ids.as_deref().unwrap_or_default())
    }

    /// Number of matching ids, running the id query on first use.
    ///
    /// # Errors
    /// Translation errors and backend failures.
    pub fn size(&mut self) -> Result<usize, QueryError> {
        Ok(self.load()?.len())
    }

    /// # Errors
    /// Translation errors and backend failures.
    pub fn ids(&mut self) -> Result<&[EntityId], QueryError> {
        self.load()
    }

    /// Entities for ids `[first, first + count)` in id-list order. A range starting past the
    /// end is an empty page.
    ///
    /// # Errors
    /// Translation errors and backend failures.
    pub fn fetch_page(&mut self, first: usize, count: usize) -> Result<Vec<Entity>, QueryError> {
        let ids = self.load()?;
        let end = first.saturating_add(count).min(ids.len());
        let Some(slice) = ids.get(first..end) else {
            return Ok(Vec::new());
        };
        if slice.is_empty() {
            return Ok(Vec::new());
        }
        let slice = slice.to_vec();
        self.dao.fetch_ids_in_order(&slice, &self.plan)
    }

    /// # Errors
    /// A zero page size, translation errors, and backend failures.
    pub fn page(&mut self, page_number: usize, page_size: usize) -> Result<Page<Entity>, QueryError> {
        check_page_size(page_size)?;
        let items = self.fetch_page(page_number.saturating_mul(page_size), page_size)?;
        Ok(Page {
            items,
            page_number,
            page_size,
            total: self.ids.as_ref().map(Vec::len),
            mode: PagingMode::DrivingQuery,
        })
    }

    /// Position of `id` in the cached list.
    ///
    /// # Errors
    /// Translation errors and backend failures.
    pub fn index_of(&mut self, id: &EntityId) -> Result<Option<usize>, QueryError> {
        self.load()?;
        Ok(self.index.get(id).copied())
    }

    /// # Errors
    /// Translation errors and backend failures.
    pub fn next_id(&mut self, current: &EntityId) -> Result<Option<EntityId>, QueryError> {
        let Some(pos) = self.index_of(current)? else {
            return Ok(None);
        };
        Ok(self.ids.as_ref().and_then(|ids| ids.get(pos + 1)).cloned())
    }

    /// # Errors
    /// Translation errors and backend failures.
    pub fn previous_id(&mut self, current: &EntityId) -> Result<Option<EntityId>, QueryError> {
        let Some(pos) = self.index_of(current)? else {
            return Ok(None);
        };
        let Some(prev) = pos.checked_sub(1) else {
            return Ok(None);
        };
        Ok(self.ids.as_ref().and_then(|ids| ids.get(prev)).cloned())
    }

    pub fn set_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter;
        self.invalidate();
    }

    pub fn set_sort(&mut self, sort: SortOrders) {
        self.sort = sort;
        self.invalidate();
    }

    /// Drops the cached ids and reloads them.
    ///
    /// # Errors
    /// Translation errors and backend failures.
    pub fn refresh(&mut self) -> Result<usize, QueryError> {
        self.invalidate();
        self.size()
    }

    fn invalidate(&mut self) {
        self.ids = None;
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_forces_driving_mode() {
        assert_eq!(select_mode(true, false), PagingMode::DrivingQuery);
        assert_eq!(select_mode(false, true), PagingMode::DrivingQuery);
        assert_eq!(select_mode(false, false), PagingMode::Offset);
    }

    #[test]
    fn has_next_uses_total_when_known() {
        let page = Page { items: vec![1, 2], page_number: 1, page_size: 2, total: Some(5), mode: PagingMode::Offset };
        assert!(page.has_next());
        let last = Page { items: vec![5], page_number: 2, page_size: 2, total: Some(5), mode: PagingMode::Offset };
        assert!(!last.has_next());
        let open = Page { items: vec![1, 2], page_number: 0, page_size: 2, total: None, mode: PagingMode::Offset };
        assert!(open.has_next());
    }
}
