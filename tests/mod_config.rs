mod common;

use common::dao_with;
use daokit::query::Filter;
use daokit::{QueryConfig, QueryError};

#[test]
fn loads_from_a_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("query.toml");
    std::fs::write(
        &path,
        "max_in_parameters = 3\nslow_query_ms = 10\n\n[property_aliases]\ncity = \"address.city\"\n",
    )
    .unwrap();
    let cfg = QueryConfig::from_path(&path).unwrap();
    assert_eq!(cfg.max_in_parameters, 3);
    assert_eq!(cfg.slow_query_ms, 10);
    assert_eq!(cfg.default_batch_size, QueryConfig::default().default_batch_size);
    assert_eq!(cfg.alias("city"), "address.city");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = QueryConfig::from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, QueryError::Io(_)));
}

#[test]
fn rejects_unknown_keys_and_zero_limits() {
    assert!(matches!(QueryConfig::from_toml_str("batch = 3"), Err(QueryError::Config(_))));
    for key in ["default_batch_size", "max_in_parameters", "max_path_depth", "path_cache_capacity"] {
        let err = QueryConfig::from_toml_str(&format!("{key} = 0")).unwrap_err();
        match err {
            QueryError::Config(msg) => assert!(msg.contains(key), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(QueryConfig::from_toml_str("").unwrap() == QueryConfig::default());
}

#[test]
fn aliases_apply_to_filters_and_sorts() {
    let cfg = QueryConfig::default().with_alias("city", "address.city");
    let d = dao_with(&common::people(6), cfg);
    // cities by id: Leiden, Gouda, Delft, none, Gouda, Delft
    let f = Filter::eq("city", "Gouda");
    assert_eq!(d.count(Some(&f), false).unwrap(), 2);
    let sort = daokit::query::SortOrders::parse("city:desc,id").unwrap();
    let ids = d.find_ids(None, None, &sort).unwrap();
    assert_eq!(ids, common::int_ids([1, 2, 5, 3, 6, 4]));
}

#[test]
fn small_in_lists_split_lookups() {
    let cfg = QueryConfig::from_toml_str("max_in_parameters = 4").unwrap();
    let d = dao_with(&common::people(10), cfg);
    let got = d.fetch_by_ids(&common::int_ids(1..=10), None, &[]).unwrap();
    assert_eq!(got.len(), 10);
    assert_eq!(d.metrics().fetch, 3);
}
