use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Primary key of a stored entity.
///
/// Integer, string and UUID keys are supported. UUIDs travel through BSON as their
/// hyphenated string form, so any string that parses as a UUID is read back as `Uuid`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Uuid(Uuid),
    Str(String),
}

impl EntityId {
    #[must_use]
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Int(i) => Bson::Int64(*i),
            Self::Uuid(u) => Bson::String(u.to_string()),
            Self::Str(s) => Bson::String(s.clone()),
        }
    }

    #[must_use]
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int32(i) => Some(Self::Int(i64::from(*i))),
            Bson::Int64(i) => Some(Self::Int(*i)),
            Bson::String(s) => Some(Uuid::parse_str(s).map_or_else(|_| Self::Str(s.clone()), Self::Uuid)),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for EntityId {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<Uuid> for EntityId {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for EntityId {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A materialized entity: its key plus the attribute document.
///
/// Associations are either nested documents (to-one), arrays of documents (to-many) or, when
/// they were not fetched, the bare key(s) of the related entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub data: BsonDocument,
}

impl Entity {
    #[must_use]
    pub fn new(id: impl Into<EntityId>, data: BsonDocument) -> Self {
        Self { id: id.into(), data }
    }

    /// Looks up a dotted path through nested documents. Arrays are not traversed.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Bson> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut cur = self.data.get(first)?;
        for part in parts {
            match cur {
                Bson::Document(d) => cur = d.get(part)?,
                _ => return None,
            }
        }
        Some(cur)
    }
}
