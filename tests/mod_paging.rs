mod common;

use common::{dao, dao_with, int_ids, people};
use daokit::query::{FetchJoinInformation, Filter, JoinType, PageRequest, PagingMode, SortOrder, SortOrders};
use daokit::{Entity, EntityId, QueryConfig, QueryError};

fn ids(items: &[Entity]) -> Vec<EntityId> {
    items.iter().map(|e| e.id.clone()).collect()
}

fn by_id() -> SortOrders {
    SortOrders::none().then(SortOrder::asc("id"))
}

#[test]
fn driving_pager_runs_the_id_query_once() {
    let d = dao(12);
    let mut pager = d.driving_pager(None, by_id(), &[], None).unwrap();
    assert!(!pager.is_loaded());
    assert_eq!(ids(&pager.page(0, 5).unwrap().items), int_ids(1..=5));
    assert_eq!(ids(&pager.page(1, 5).unwrap().items), int_ids(6..=10));
    let last = pager.page(2, 5).unwrap();
    assert_eq!(ids(&last.items), int_ids([11, 12]));
    assert_eq!(last.total, Some(12));
    assert_eq!(last.mode, PagingMode::DrivingQuery);
    assert!(!last.has_next());
    assert!(pager.page(3, 5).unwrap().is_empty());
    assert!(pager.fetch_page(40, 5).unwrap().is_empty());
    assert_eq!(pager.size().unwrap(), 12);
    assert_eq!(d.metrics().ids, 1);
    assert_eq!(d.metrics().fetch, 3);
}

#[test]
fn driving_pager_navigates_and_invalidates() {
    let d = dao(12);
    let mut pager = d
        .driving_pager(Some(Filter::contains("tags", "vip")), by_id(), &[], None)
        .unwrap();
    assert_eq!(pager.ids().unwrap(), int_ids([2, 4, 6, 8, 12]).as_slice());
    assert_eq!(pager.index_of(&EntityId::Int(6)).unwrap(), Some(2));
    assert_eq!(pager.next_id(&EntityId::Int(6)).unwrap(), Some(EntityId::Int(8)));
    assert_eq!(pager.previous_id(&EntityId::Int(6)).unwrap(), Some(EntityId::Int(4)));
    assert_eq!(pager.previous_id(&EntityId::Int(2)).unwrap(), None);
    assert_eq!(pager.next_id(&EntityId::Int(12)).unwrap(), None);
    assert_eq!(pager.next_id(&EntityId::Int(3)).unwrap(), None);

    pager.set_filter(Some(Filter::eq("status", "PENDING")));
    assert!(!pager.is_loaded());
    assert_eq!(pager.size().unwrap(), 4);
    pager.set_sort(SortOrders::none().then(SortOrder::desc("id")));
    assert_eq!(pager.ids().unwrap(), int_ids([11, 8, 5, 2]).as_slice());
    assert_eq!(pager.refresh().unwrap(), 4);
    assert_eq!(d.metrics().ids, 4);
}

#[test]
fn driving_pager_caps_results() {
    let d = dao(12);
    let mut pager = d.driving_pager(None, by_id(), &[], Some(7)).unwrap();
    assert_eq!(pager.size().unwrap(), 7);
    assert_eq!(ids(&pager.page(1, 5).unwrap().items), int_ids([6, 7]));
    assert!(matches!(pager.page(0, 0), Err(QueryError::Validation(_))));
}

#[test]
fn driving_pager_loads_fetch_joins() {
    let d = dao(6);
    let joins = [FetchJoinInformation::with_type("orders", JoinType::Left)];
    let mut pager = d.driving_pager(None, by_id(), &joins, None).unwrap();
    let page = pager.page(0, 3).unwrap();
    assert_eq!(ids(&page.items), int_ids([1, 2, 3]));
    let orders = page.items[1].data.get_array("orders").unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o.as_document().is_some()));
}

#[test]
fn offset_pager_rejects_fan_out() {
    let d = dao(6);
    let err = d.offset_pager(None, &[FetchJoinInformation::new("orders")]).err().unwrap();
    assert!(matches!(err, QueryError::Validation(_)));
    let err = d.offset_pager(None, &[FetchJoinInformation::new("tags")]).err().unwrap();
    assert!(matches!(err, QueryError::Validation(_)));

    let pager = d.offset_pager(Some(Filter::ge("age", 30)), &[FetchJoinInformation::new("address")]).unwrap();
    let page = pager.page(&PageRequest::new(0, 2, by_id())).unwrap();
    // ages 27, 34, 41, 48, 25, 32
    assert_eq!(ids(&page.items), int_ids([2, 3]));
    assert_eq!(page.mode, PagingMode::Offset);
    assert_eq!(page.total, None);
    assert!(page.items[0].data.get_document("address").is_ok());
    assert!(pager.page(&PageRequest::new(0, 0, by_id())).is_err());
}

#[test]
fn fetch_switches_to_driving_mode_for_to_many_joins() {
    let d = dao(12);
    let joins = [FetchJoinInformation::new("orders")];
    let got = d.fetch(None, &PageRequest::new(0, 4, by_id()), &joins).unwrap();
    assert_eq!(ids(&got), int_ids(1..=4));
    assert_eq!(d.metrics().ids, 1);
    assert!(got[1].data.get_array("orders").unwrap().iter().all(|o| o.as_document().is_some()));
    let rendered = d.explain(None, &PageRequest::new(1, 4, by_id()), &joins).unwrap();
    assert!(rendered.text.starts_with("SELECT e.id FROM Person e"));
    assert!(rendered.text.ends_with("LIMIT 8"));
}

#[test]
fn offset_and_driving_modes_agree() {
    let items = people(20);
    let offset = dao_with(&items, QueryConfig::default());
    let driving = dao_with(&items, QueryConfig { prefer_driving_query: true, ..QueryConfig::default() });
    let filter = Filter::or(vec![Filter::eq("address.city", "Delft"), Filter::gt("score", 20)]).unwrap();
    let sort = SortOrders::none().then(SortOrder::desc("age")).then(SortOrder::asc("id"));
    for page in 0..4 {
        let request = PageRequest::new(page, 3, sort.clone());
        let a = offset.page(Some(&filter), &request, &[]).unwrap();
        let b = driving.page(Some(&filter), &request, &[]).unwrap();
        assert_eq!(a.mode, PagingMode::Offset);
        assert_eq!(b.mode, PagingMode::DrivingQuery);
        assert_eq!(ids(&a.items), ids(&b.items), "page {page}");
        assert_eq!(a.total, b.total);
    }
}
