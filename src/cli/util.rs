use crate::errors::QueryError;
use crate::query::{FetchJoinInformation, Filter, SortOrders, parse_fetch_joins, parse_filter_json};
use crate::types::EntityId;
use bson::Bson;

pub fn parse_filter_input(s: Option<&str>) -> Result<Option<Filter>, QueryError> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(parse_filter_json).transpose()
}

pub fn parse_sort_input(s: Option<&str>) -> Result<SortOrders, QueryError> {
    s.map_or_else(|| Ok(SortOrders::none()), SortOrders::parse)
}

pub fn parse_joins_input(s: Option<&str>) -> Result<Vec<FetchJoinInformation>, QueryError> {
    s.map_or_else(|| Ok(Vec::new()), parse_fetch_joins)
}

/// Integers become integer keys; anything else is a string (or UUID) key.
pub fn parse_id_input(s: &str) -> EntityId {
    let s = s.trim();
    match s.parse::<i64>() {
        Ok(i) => EntityId::Int(i),
        Err(_) => EntityId::from_bson(&Bson::String(s.to_string())).unwrap_or_else(|| s.into()),
    }
}
