//! Entity metadata needed to resolve property paths.
//!
//! This is deliberately small: attribute names and how each attribute relates to other
//! entity types. It is the per-entity-type accessor capability both the translator and the
//! in-memory evaluator resolve paths against.

pub mod path;

use crate::errors::QueryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub use path::{PathResolver, PathSegment, ResolvedPath};

fn default_value_column() -> String {
    "value".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    Basic,
    /// Value object stored inline; paths continue into `model` without a join.
    Embedded { model: String },
    ToOne { target: String },
    ToMany { target: String },
    /// Collection of plain values kept in a separate collection table.
    ElementCollection {
        table: String,
        #[serde(default = "default_value_column")]
        value_column: String,
    },
}

impl AttributeKind {
    /// Whether reaching through this attribute requires a join.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        matches!(self, Self::ToOne { .. } | Self::ToMany { .. } | Self::ElementCollection { .. })
    }

    /// Whether a join over this attribute can multiply result rows.
    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Self::ToMany { .. } | Self::ElementCollection { .. })
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::ToOne { target } | Self::ToMany { target } => Some(target),
            Self::Embedded { model } => Some(model),
            Self::Basic | Self::ElementCollection { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityModel {
    pub name: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeKind>,
}

impl EntityModel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), id_field: default_id_field(), attributes: BTreeMap::new() }
    }

    #[must_use]
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    #[must_use]
    pub fn basic(self, name: &str) -> Self {
        self.attr(name, AttributeKind::Basic)
    }

    #[must_use]
    pub fn embedded(self, name: &str, model: &str) -> Self {
        self.attr(name, AttributeKind::Embedded { model: model.to_string() })
    }

    #[must_use]
    pub fn to_one(self, name: &str, target: &str) -> Self {
        self.attr(name, AttributeKind::ToOne { target: target.to_string() })
    }

    #[must_use]
    pub fn to_many(self, name: &str, target: &str) -> Self {
        self.attr(name, AttributeKind::ToMany { target: target.to_string() })
    }

    #[must_use]
    pub fn element_collection(self, name: &str, table: &str) -> Self {
        self.attr(
            name,
            AttributeKind::ElementCollection {
                table: table.to_string(),
                value_column: default_value_column(),
            },
        )
    }

    #[must_use]
    pub fn attr(mut self, name: &str, kind: AttributeKind) -> Self {
        self.attributes.insert(name.to_string(), kind);
        self
    }

    /// Attribute lookup; the id field always resolves as a basic attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeKind> {
        static ID: AttributeKind = AttributeKind::Basic;
        match self.attributes.get(name) {
            Some(kind) => Some(kind),
            None if name == self.id_field => Some(&ID),
            None => None,
        }
    }
}

/// Where an element collection lives: owning entity, attribute and value column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTable {
    pub owner: String,
    pub attribute: String,
    pub value_column: String,
}

/// Immutable set of entity models, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, EntityModel>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, model: EntityModel) -> Self {
        self.models.insert(model.name.clone(), model);
        self
    }

    #[must_use]
    pub fn from_models(models: Vec<EntityModel>) -> Self {
        models.into_iter().fold(Self::new(), Self::with)
    }

    /// Parses a JSON array of entity models.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or an association names an unknown model.
    pub fn from_json_str(s: &str) -> Result<Self, QueryError> {
        let models: Vec<EntityModel> = serde_json::from_str(s)?;
        let reg = Self::from_models(models);
        reg.check_targets()?;
        Ok(reg)
    }

    /// # Errors
    /// Returns `QueryError::UnknownEntity` for the first association target not registered.
    pub fn check_targets(&self) -> Result<(), QueryError> {
        for model in self.models.values() {
            for kind in model.attributes.values() {
                if let Some(target) = kind.target()
                    && !self.models.contains_key(target)
                {
                    return Err(QueryError::UnknownEntity(target.to_string()));
                }
            }
        }
        Ok(())
    }

    /// # Errors
    /// Returns `QueryError::UnknownEntity` if no model with that name is registered.
    pub fn get(&self, entity: &str) -> Result<&EntityModel, QueryError> {
        self.models.get(entity).ok_or_else(|| QueryError::UnknownEntity(entity.to_string()))
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn collection_table(&self, table: &str) -> Option<CollectionTable> {
        self.models.values().find_map(|m| {
            m.attributes.iter().find_map(|(attr, kind)| match kind {
                AttributeKind::ElementCollection { table: t, value_column } if t == table => {
                    Some(CollectionTable {
                        owner: m.name.clone(),
                        attribute: attr.clone(),
                        value_column: value_column.clone(),
                    })
                }
                _ => None,
            })
        })
    }
}
