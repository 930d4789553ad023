#![allow(dead_code)]

use bson::{Bson, DateTime, Document, doc};
use daokit::{
    EntityDao, EntityId, EntityModel, Entity, MemoryBackend, ModelRegistry, PathResolver,
    QueryConfig,
};
use std::sync::Arc;

pub const NAMES: [&str; 6] = ["Ann", "bob", "Carl", "dora", "Eve", "Finn"];
pub const CITIES: [&str; 3] = ["Delft", "Leiden", "Gouda"];
pub const STATUSES: [&str; 3] = ["ACTIVE", "INACTIVE", "PENDING"];

pub fn registry() -> Arc<ModelRegistry> {
    Arc::new(
        ModelRegistry::new()
            .with(
                EntityModel::new("Person")
                    .basic("name")
                    .basic("age")
                    .basic("score")
                    .basic("salary")
                    .basic("born")
                    .basic("status")
                    .basic("step")
                    .basic("price")
                    .to_one("address", "Address")
                    .to_many("orders", "Order")
                    .element_collection("tags", "person_tags"),
            )
            .with(EntityModel::new("Address").basic("city").basic("zip"))
            .with(EntityModel::new("Order").basic("total").basic("item")),
    )
}

/// Deterministic person `id`, with nested association documents.
///
/// Every fourth person has no address, `id % 3` orders and tags that depend on parity;
/// every fifth person has no tags at all.
pub fn person(id: i64) -> Entity {
    let idx = usize::try_from(id).unwrap();
    let mut d = doc! {
        "id": id,
        "name": NAMES[idx % NAMES.len()],
        "age": 20 + (id * 7) % 30,
        "score": id as f64 * 1.5,
        "salary": Bson::Int64(id * 1000),
        "born": DateTime::from_millis(id * 86_400_000),
        "status": STATUSES[idx % STATUSES.len()],
        "step": 2 + id % 3,
    };
    if id % 4 != 0 {
        d.insert("address", doc! {"id": 100 + id, "city": CITIES[idx % CITIES.len()], "zip": format!("{:04}", id * 11)});
    }
    let orders: Vec<Bson> = (0..id % 3)
        .map(|k| {
            let oid = id * 10 + k;
            Bson::Document(doc! {"id": oid, "total": oid % 17, "item": if k == 0 { "pen" } else { "ink" }})
        })
        .collect();
    d.insert("orders", orders);
    let tags: Vec<Bson> = if id % 5 == 0 {
        Vec::new()
    } else if id % 2 == 0 {
        vec!["vip".into(), "new".into()]
    } else {
        vec!["new".into()]
    };
    d.insert("tags", tags);
    Entity::new(id, d)
}

pub fn people(n: i64) -> Vec<Entity> {
    (1..=n).map(person).collect()
}

pub fn backend_with(items: &[Entity]) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new(registry()));
    for e in items {
        backend.insert("Person", e.clone()).unwrap();
    }
    backend
}

pub fn resolver(config: QueryConfig) -> Arc<PathResolver> {
    Arc::new(PathResolver::new(registry(), Arc::new(config)))
}

pub fn dao_with(items: &[Entity], config: QueryConfig) -> EntityDao<MemoryBackend> {
    EntityDao::new(backend_with(items), resolver(config), "Person").unwrap()
}

pub fn dao(n: i64) -> EntityDao<MemoryBackend> {
    dao_with(&people(n), QueryConfig::default())
}

pub fn ids_of(items: &[Entity]) -> Vec<EntityId> {
    items.iter().map(|e| e.id.clone()).collect()
}

pub fn int_ids(ids: impl IntoIterator<Item = i64>) -> Vec<EntityId> {
    ids.into_iter().map(EntityId::Int).collect()
}

pub fn get<'e>(e: &'e Entity, path: &str) -> Option<&'e Bson> {
    e.get_path(path)
}

pub fn doc_of(e: &Entity) -> &Document {
    &e.data
}
