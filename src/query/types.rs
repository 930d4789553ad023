use crate::errors::QueryError;
use bson::Bson;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Equal,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl CmpOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
        }
    }
}

/// Right-hand side of a modulo filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Divisor {
    Literal(i64),
    Property(String),
}

/// Search criteria as an immutable expression tree.
///
/// Build values through the constructors on `Filter` (see `filter.rs`); they enforce the
/// invariants that the variants alone cannot express (non-empty combinators, non-zero
/// literal divisors, normalized numeric text). Equality is structural.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare { op: CmpOp, path: String, value: Bson },
    Like { path: String, pattern: String, case_sensitive: bool },
    /// Inclusive on both ends.
    Between { path: String, start: Bson, end: Bson },
    In { path: String, values: Vec<Bson> },
    /// Membership of `value` in a collection-valued property.
    Contains { path: String, value: Bson },
    IsNull { path: String },
    Modulo { path: String, divisor: Divisor, remainder: i64 },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Compare,
    Like,
    Between,
    In,
    Contains,
    IsNull,
    Modulo,
    And,
    Or,
    Not,
}

impl FilterKind {
    pub const ALL: [Self; 10] = [
        Self::Compare,
        Self::Like,
        Self::Between,
        Self::In,
        Self::Contains,
        Self::IsNull,
        Self::Modulo,
        Self::And,
        Self::Or,
        Self::Not,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compare => "Compare",
            Self::Like => "Like",
            Self::Between => "Between",
            Self::In => "In",
            Self::Contains => "Contains",
            Self::IsNull => "IsNull",
            Self::Modulo => "Modulo",
            Self::And => "And",
            Self::Or => "Or",
            Self::Not => "Not",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(QueryError::validation(format!("unknown sort direction `{s}`")))
        }
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    pub property: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortOrder {
    #[must_use]
    pub fn asc(property: impl Into<String>) -> Self {
        Self { property: property.into(), direction: SortDirection::Asc }
    }

    #[must_use]
    pub fn desc(property: impl Into<String>) -> Self {
        Self { property: property.into(), direction: SortDirection::Desc }
    }
}

/// Ordered sort specification. Equality is positional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortOrders(Vec<SortOrder>);

impl SortOrders {
    #[must_use]
    pub fn new(orders: Vec<SortOrder>) -> Self {
        Self(orders)
    }

    #[must_use]
    pub fn none() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn then(mut self, order: SortOrder) -> Self {
        self.0.push(order);
        self
    }

    /// First order for `property`, if any.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&SortOrder> {
        self.0.iter().find(|o| o.property == property)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SortOrder> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a SortOrders {
    type Item = &'a SortOrder;
    type IntoIter = std::slice::Iter<'a, SortOrder>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum JoinType {
    #[default]
    Left,
    Inner,
    Right,
}

impl JoinType {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Left => "LEFT JOIN",
            Self::Inner => "INNER JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

impl FromStr for JoinType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "inner" => Ok(Self::Inner),
            "right" => Ok(Self::Right),
            _ => Err(QueryError::validation(format!("unknown join type `{s}`"))),
        }
    }
}

impl<'de> Deserialize<'de> for JoinType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A declared eager load of a related attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchJoinInformation {
    pub path: String,
    #[serde(default)]
    pub join_type: JoinType,
}

impl FetchJoinInformation {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), join_type: JoinType::Left }
    }

    #[must_use]
    pub fn with_type(path: impl Into<String>, join_type: JoinType) -> Self {
        Self { path: path.into(), join_type }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_number: usize,
    pub page_size: usize,
    #[serde(default)]
    pub sort: SortOrders,
}

impl PageRequest {
    #[must_use]
    pub fn new(page_number: usize, page_size: usize, sort: SortOrders) -> Self {
        Self { page_number, page_size, sort }
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.page_number.saturating_mul(self.page_size)
    }
}
