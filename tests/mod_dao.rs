mod common;

use bson::{Bson, doc};
use common::{dao, dao_with, int_ids, people, person, registry, resolver};
use daokit::backend::BackendError;
use daokit::query::{
    Divisor, FetchJoinInformation, Filter, FilterKind, PageRequest, PagingMode, SelectQuery,
    SortOrder, SortOrders,
};
use daokit::{Backend, Entity, EntityDao, EntityId, MemoryBackend, QueryConfig, QueryError, ResultSet};
use std::sync::Arc;

fn ids(items: &[Entity]) -> Vec<EntityId> {
    items.iter().map(|e| e.id.clone()).collect()
}

#[test]
fn unknown_entity_is_rejected() {
    let r = EntityDao::new(common::backend_with(&[]), resolver(QueryConfig::default()), "Ghost");
    assert!(matches!(r, Err(QueryError::UnknownEntity(ref e)) if e == "Ghost"));
}

#[test]
fn count_agrees_with_the_evaluator() {
    let d = dao(12);
    let items = people(12);
    assert_eq!(d.count(None, false).unwrap(), 12);
    let filters = [
        Filter::gt("orders.total", 5),
        Filter::eq("address.city", "Delft"),
        Filter::contains("tags", "vip"),
        Filter::negate(Filter::eq("orders.item", "ink")),
        Filter::or(vec![Filter::is_null("address"), Filter::lt("age", 30)]).unwrap(),
    ];
    for f in &filters {
        let expected = d.evaluator().filter(f, &items).unwrap().len() as u64;
        assert_eq!(d.count(Some(f), false).unwrap(), expected, "{f:?}");
    }
}

#[test]
fn empty_in_counts_nothing() {
    let d = dao(6);
    assert_eq!(d.count(Some(&Filter::in_values("age", Vec::<i32>::new())), false).unwrap(), 0);
}

#[test]
fn find_ids_honors_sort_and_limit() {
    // ages 27, 34, 41, 48, 25
    let d = dao(12);
    let f = Filter::le("id", 5);
    let by_age = SortOrders::none().then(SortOrder::asc("age"));
    assert_eq!(d.find_ids(Some(&f), None, &by_age).unwrap(), int_ids([5, 1, 2, 3, 4]));
    assert_eq!(d.find_ids(Some(&f), Some(2), &by_age).unwrap(), int_ids([5, 1]));
    assert_eq!(d.metrics().ids, 2);
}

#[test]
fn to_many_filters_return_each_root_once() {
    let d = dao(12);
    let f = Filter::gt("orders.total", 0);
    let found = d.find_ids(Some(&f), None, &SortOrders::none()).unwrap();
    let mut unique = found.clone();
    unique.dedup();
    assert_eq!(found, unique);
    assert!(found.contains(&EntityId::Int(2)));
}

#[test]
fn fetch_by_ids_follows_input_order() {
    let d = dao(6);
    let got = d.fetch_by_ids(&int_ids([3, 1, 3, 99, 2]), None, &[]).unwrap();
    assert_eq!(ids(&got), int_ids([3, 1, 2]));
    assert_eq!(d.metrics().fetch, 1);
    let empty = d.fetch_by_ids(&int_ids([3, 1]), Some(&SortOrders::none()), &[]).unwrap();
    assert_eq!(ids(&empty), int_ids([3, 1]));
}

#[test]
fn sorted_fetch_by_ids_merges_chunks() {
    let config = QueryConfig { max_in_parameters: 2, ..QueryConfig::default() };
    let d = dao_with(&people(6), config);
    let sort = SortOrders::none().then(SortOrder::desc("age"));
    let got = d.fetch_by_ids(&int_ids([1, 2, 3, 4, 5]), Some(&sort), &[]).unwrap();
    assert_eq!(ids(&got), int_ids([4, 3, 2, 1, 5]));
    assert_eq!(d.metrics().fetch, 3);
}

#[test]
fn explicit_sort_overrides_input_order() {
    // ages 27, 34, 41, 48, 25
    let d = dao(5);
    let by_age = SortOrders::none().then(SortOrder::asc("age"));
    let sorted = d.fetch_by_ids(&int_ids([3, 5, 1]), Some(&by_age), &[]).unwrap();
    assert_eq!(ids(&sorted), int_ids([5, 1, 3]));
    let unsorted = d.fetch_by_ids(&int_ids([3, 5, 1]), None, &[]).unwrap();
    assert_eq!(ids(&unsorted), int_ids([3, 5, 1]));
}

#[test]
fn fetch_by_id_hydrates_requested_joins() {
    let d = dao(6);
    let plain = d.fetch_by_id(&EntityId::Int(2), &[]).unwrap().unwrap();
    assert_eq!(plain.data.get_array("orders").unwrap(), &vec![Bson::Int64(20), Bson::Int64(21)]);
    assert_eq!(plain.data.get("address"), Some(&Bson::Int64(102)));

    let joins = [FetchJoinInformation::new("orders"), FetchJoinInformation::new("address")];
    let loaded = d.fetch_by_id(&EntityId::Int(2), &joins).unwrap().unwrap();
    let orders = loaded.data.get_array("orders").unwrap();
    let items: Vec<&str> = orders
        .iter()
        .map(|o| o.as_document().unwrap().get_str("item").unwrap())
        .collect();
    assert_eq!(items, vec!["pen", "ink"]);
    assert_eq!(loaded.data.get_document("address").unwrap().get_str("city").unwrap(), "Gouda");

    assert!(d.fetch_by_id(&EntityId::Int(42), &joins).unwrap().is_none());
}

#[test]
fn fetch_join_must_name_an_association() {
    let d = dao(3);
    let err = d.fetch_by_id(&EntityId::Int(1), &[FetchJoinInformation::new("name")]).unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn unique_lookup_with_and_without_case() {
    // "Ann" is the name of persons 6 and 12
    let d = dao(12);
    let hit = d.fetch_by_unique_property("name", "ann", false, &[]).unwrap().unwrap();
    assert_eq!(hit.id, EntityId::Int(6));
    assert!(d.fetch_by_unique_property("name", "ann", true, &[]).unwrap().is_none());
    let exact = d.fetch_by_unique_property("name", "bob", true, &[]).unwrap().unwrap();
    assert_eq!(exact.id, EntityId::Int(1));
    let by_number = d.fetch_by_unique_property("salary", 3000_i64, true, &[]).unwrap().unwrap();
    assert_eq!(by_number.id, EntityId::Int(3));
    assert_eq!(d.metrics().unique, 4);
}

#[test]
fn distinct_values_of_a_property_and_a_collection_table() {
    let d = dao(12);
    let by_status = SortOrders::none().then(SortOrder::asc("status"));
    let statuses = d.find_distinct_values(None, "status", &by_status).unwrap();
    assert_eq!(statuses, vec![Bson::from("ACTIVE"), Bson::from("INACTIVE"), Bson::from("PENDING")]);

    let cities = d
        .find_distinct_values(
            Some(&Filter::contains("tags", "vip")),
            "address.city",
            &SortOrders::none().then(SortOrder::desc("address.city")),
        )
        .unwrap();
    assert!(cities.windows(2).all(|w| w[0] != w[1]));

    let tags = d.find_distinct_in_collection_table("person_tags", "value").unwrap();
    assert_eq!(tags, vec![Bson::from("new"), Bson::from("vip")]);
    assert!(matches!(
        d.find_distinct_in_collection_table("nope", "value"),
        Err(QueryError::UnknownEntity(_))
    ));
}

#[test]
fn unsupported_filters_fail_before_execution() {
    let backend = Arc::new(MemoryBackend::new(registry()).with_unsupported([FilterKind::Like]));
    let d = EntityDao::new(backend, resolver(QueryConfig::default()), "Person").unwrap();
    let err = d.count(Some(&Filter::like("name", "A%")), false).unwrap_err();
    match err {
        QueryError::UnsupportedFilter { kind, backend } => {
            assert_eq!(kind, "Like");
            assert_eq!(backend, "memory");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(d.metrics().queries(), 0);
}

#[test]
fn zero_divisors_are_errors() {
    let d = dao_with(&[Entity::new(1, doc! {"id": 1_i64, "age": 30, "step": 0})], QueryConfig::default());
    let f = Filter::modulo("age", Divisor::Property("step".into()), 0).unwrap();
    let pushed = d.count(Some(&f), false).unwrap_err();
    assert!(matches!(pushed, QueryError::Validation(ref m) if m.contains("zero")), "{pushed:?}");
    let candidates = [Entity::new(1, doc! {"id": 1_i64, "age": 30, "step": 0})];
    let in_memory = d.evaluator().filter(&f, &candidates);
    assert!(matches!(in_memory, Err(QueryError::Validation(_))));
    assert!(matches!(d.find_ids(Some(&f), None, &SortOrders::none()), Err(QueryError::Validation(_))));
    assert_eq!(d.metrics().backend_errors, 0);
    assert!(Filter::modulo("age", Divisor::Literal(0), 0).is_err());
}

#[test]
fn long_ids_beyond_double_precision_stay_distinct() {
    const BIG: i64 = 1 << 53;
    let items = [
        Entity::new(BIG, doc! {"id": BIG, "name": "first", "salary": BIG}),
        Entity::new(BIG + 1, doc! {"id": BIG + 1, "name": "second", "salary": BIG + 1}),
    ];
    let d = dao_with(&items, QueryConfig::default());
    let found = d.fetch_by_id(&EntityId::Int(BIG + 1), &[]).unwrap().unwrap();
    assert_eq!(found.id, EntityId::Int(BIG + 1));
    assert_eq!(found.data.get_str("name").unwrap(), "second");
    assert_eq!(d.count(Some(&Filter::eq("salary", BIG)), false).unwrap(), 1);
    let both = d.fetch_by_ids(&int_ids([BIG + 1, BIG]), None, &[]).unwrap();
    assert_eq!(ids(&both), int_ids([BIG + 1, BIG]));
    let salaries = d.find_distinct_values(None, "salary", &SortOrders::none()).unwrap();
    assert_eq!(salaries.len(), 2);
}

struct Broken;

impl Backend for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn execute(&self, _query: &SelectQuery) -> Result<ResultSet, BackendError> {
        Err(BackendError::Execution("connection reset".into()))
    }
}

#[test]
fn backend_failures_propagate() {
    let d = EntityDao::new(Arc::new(Broken), resolver(QueryConfig::default()), "Person").unwrap();
    let err = d.find(None, &SortOrders::none()).unwrap_err();
    assert!(matches!(err, QueryError::Backend(BackendError::Execution(ref m)) if m == "connection reset"));
    assert_eq!(d.metrics().backend_errors, 1);
}

#[test]
fn page_reports_total_and_mode() {
    let d = dao(12);
    let by_id = SortOrders::none().then(SortOrder::asc("id"));
    let page = d.page(None, &PageRequest::new(1, 5, by_id.clone()), &[]).unwrap();
    assert_eq!(ids(&page.items), int_ids(6..=10));
    assert_eq!(page.total, Some(12));
    assert_eq!(page.mode, PagingMode::Offset);
    assert!(page.has_next());

    let joined = d.page(None, &PageRequest::new(2, 5, by_id), &[FetchJoinInformation::new("orders")]).unwrap();
    assert_eq!(ids(&joined.items), int_ids([11, 12]));
    assert_eq!(joined.mode, PagingMode::DrivingQuery);
    assert!(!joined.has_next());
}

#[test]
fn person_fixture_stores_associations() {
    let d = dao(4);
    assert_eq!(d.backend().len("Address"), 3);
    assert_eq!(d.backend().len("Order"), people(4).iter().map(|p| p.data.get_array("orders").unwrap().len()).sum::<usize>());
    assert_eq!(person(4).data.get("address"), None);
}
