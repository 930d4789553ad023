use crate::errors::QueryError;
use crate::types::EntityId;
use std::iter::FusedIterator;

/// Bounded-memory cursor over an ordered id list.
///
/// Ids are consumed in chunks of `batch_size`; `fetch` runs exactly once per chunk and the
/// cursor yields that chunk's items one at a time before asking for the next one, so at
/// most one chunk is resident. For `n` ids there are `ceil(n / batch_size)` fetches.
///
/// Ordering is whatever `fetch` returns for each chunk: nothing is promised across or
/// within chunks beyond the total number of items. Bulk exporters do not care; callers that
/// need input order must reorder inside `fetch`.
///
/// The cursor is single-use. Once exhausted, or after a fetch error, every further call to
/// `next` returns `None` without calling `fetch` again.
pub struct BatchCursor<T, F>
where
    F: FnMut(&[EntityId]) -> Result<Vec<T>, QueryError>,
{
    ids: Vec<EntityId>,
    pos: usize,
    batch_size: usize,
    buffer: std::vec::IntoIter<T>,
    fetch: F,
    fetches: usize,
    done: bool,
}

impl<T, F> BatchCursor<T, F>
where
    F: FnMut(&[EntityId]) -> Result<Vec<T>, QueryError>,
{
    /// # Errors
    /// A `batch_size` of zero.
    pub fn new(ids: Vec<EntityId>, batch_size: usize, fetch: F) -> Result<Self, QueryError> {
        if batch_size == 0 {
            return Err(QueryError::validation("batch size must be greater than zero"));
        }
        Ok(Self {
            ids,
            pos: 0,
            batch_size,
            buffer: Vec::new().into_iter(),
            fetch,
            fetches: 0,
            done: false,
        })
    }

    /// Ids not yet handed to `fetch`.
    #[must_use]
    pub fn remaining_ids(&self) -> &[EntityId] {
        &self.ids[self.pos..]
    }

    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<T, F> Iterator for BatchCursor<T, F>
where
    F: FnMut(&[EntityId]) -> Result<Vec<T>, QueryError>,
{
    type Item = Result<T, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            if self.done || self.pos >= self.ids.len() {
                self.done = true;
                return None;
            }
            let end = self.pos.saturating_add(self.batch_size).min(self.ids.len());
            let chunk = &self.ids[self.pos..end];
            self.pos = end;
            self.fetches += 1;
            match (self.fetch)(chunk) {
                Ok(items) => self.buffer = items.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.buffer.len(), None)
    }
}

impl<T, F> FusedIterator for BatchCursor<T, F> where
    F: FnMut(&[EntityId]) -> Result<Vec<T>, QueryError>
{
}
