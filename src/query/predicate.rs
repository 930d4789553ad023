//! Backend query representation produced by the translator.
//!
//! A `SelectQuery` is plain data: a root entity, the joins hanging off it, a predicate tree
//! over aliased columns, and the projection/ordering/window of one of the five query shapes.
//! Backends either execute it directly or render it to text (see `render.rs`).

use super::types::{CmpOp, JoinType, SortDirection};
use bson::Bson;
use std::fmt;

/// A value reached from a query alias. An empty `field` denotes the bound value itself,
/// as for the element alias of a collection-table join.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub field: Vec<String>,
}

impl ColumnRef {
    #[must_use]
    pub fn new(alias: impl Into<String>, field: Vec<String>) -> Self {
        Self { alias: alias.into(), field }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alias)?;
        for part in &self.field {
            write!(f, ".{part}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Bson),
    Column(ColumnRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    Compare { column: ColumnRef, op: CmpOp, value: Bson },
    /// Equality with both sides folded to lower case.
    EqualFolded { column: ColumnRef, value: String },
    Like { column: ColumnRef, pattern: String, case_sensitive: bool },
    Between { column: ColumnRef, start: Bson, end: Bson },
    /// Never empty; an empty IN list is translated to `False`.
    In { column: ColumnRef, values: Vec<Bson> },
    MemberOf { column: ColumnRef, value: Bson },
    IsNull { column: ColumnRef },
    Modulo { column: ColumnRef, divisor: Operand, remainder: i64 },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, p) | (p, Self::True) => p,
            (a, b) => Self::And(Box::new(a), Box::new(b)),
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, p) | (p, Self::False) => p,
            (a, b) => Self::Or(Box::new(a), Box::new(b)),
        }
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTarget {
    Entity(String),
    /// Elements of a collection table; the alias binds one element value per row.
    Elements { table: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Dotted path from the query root this join resolves.
    pub path: String,
    /// Alias the join hangs off.
    pub parent: String,
    /// Attribute read from the parent row, possibly through embedded values.
    pub attribute: Vec<String>,
    pub alias: String,
    pub target: JoinTarget,
    pub join_type: JoinType,
    /// Whether the join can multiply rows.
    pub multi: bool,
    /// Whether the joined data is loaded into the selected entities.
    pub fetch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Entity,
    Count { distinct: bool },
    Ids,
    Values(Vec<ColumnRef>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    Count,
    Ids,
    Fetch,
    Unique,
    Distinct,
}

impl QueryShape {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Ids => "ids",
            Self::Fetch => "fetch",
            Self::Unique => "unique",
            Self::Distinct => "distinct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub shape: QueryShape,
    pub entity: String,
    pub root_alias: String,
    /// Name of the id attribute on the root entity.
    pub id_field: String,
    pub selection: Selection,
    pub joins: Vec<Join>,
    pub predicate: Predicate,
    /// Collapse duplicate result rows (entities by id, values by content).
    pub distinct: bool,
    pub order_by: Vec<OrderTerm>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    #[must_use]
    pub fn fetch_joins(&self) -> impl Iterator<Item = &Join> {
        self.joins.iter().filter(|j| j.fetch)
    }
}
