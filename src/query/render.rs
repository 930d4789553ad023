//! Renders a [`SelectQuery`] as parameterized JPQL-style text.
//!
//! Values are never inlined: each one is bound as a positional parameter (`?1`, `?2`, ...)
//! and returned alongside the text.

use super::predicate::{ColumnRef, Operand, Predicate, SelectQuery, Selection};
use super::types::SortDirection;
use bson::Bson;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub text: String,
    pub params: Vec<Bson>,
}

impl fmt::Display for RenderedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        for (i, p) in self.params.iter().enumerate() {
            write!(f, "\n  ?{} = {p}", i + 1)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct QueryWriter {
    text: String,
    params: Vec<Bson>,
}

impl QueryWriter {
    fn push(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn push_param(&mut self, value: &Bson) {
        self.params.push(value.clone());
        self.text.push('?');
        self.text.push_str(&self.params.len().to_string());
    }

    fn column(&mut self, column: &ColumnRef) {
        self.text.push_str(&column.to_string());
    }

    fn predicate(&mut self, p: &Predicate) {
        match p {
            Predicate::True => self.push("1 = 1"),
            Predicate::False => self.push("1 = 0"),
            Predicate::Compare { column, op, value } => {
                self.column(column);
                self.push(&format!(" {} ", op.symbol()));
                self.push_param(value);
            }
            Predicate::EqualFolded { column, value } => {
                self.push("LOWER(");
                self.column(column);
                self.push(") = LOWER(");
                self.push_param(&Bson::String(value.clone()));
                self.push(")");
            }
            Predicate::Like { column, pattern, case_sensitive } => {
                let pattern = Bson::String(pattern.clone());
                if *case_sensitive {
                    self.column(column);
                    self.push(" LIKE ");
                    self.push_param(&pattern);
                } else {
                    self.push("LOWER(");
                    self.column(column);
                    self.push(") LIKE LOWER(");
                    self.push_param(&pattern);
                    self.push(")");
                }
            }
            Predicate::Between { column, start, end } => {
                self.column(column);
                self.push(" BETWEEN ");
                self.push_param(start);
                self.push(" AND ");
                self.push_param(end);
            }
            Predicate::In { column, values } => {
                self.column(column);
                self.push(" IN (");
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push_param(v);
                }
                self.push(")");
            }
            Predicate::MemberOf { column, value } => {
                self.push_param(value);
                self.push(" MEMBER OF ");
                self.column(column);
            }
            Predicate::IsNull { column } => {
                self.column(column);
                self.push(" IS NULL");
            }
            Predicate::Modulo { column, divisor, remainder } => {
                self.push("MOD(");
                self.column(column);
                self.push(", ");
                match divisor {
                    Operand::Value(v) => self.push_param(v),
                    Operand::Column(c) => self.column(c),
                }
                self.push(") = ");
                self.push_param(&Bson::Int64(*remainder));
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                let op = if matches!(p, Predicate::And(..)) { " AND " } else { " OR " };
                self.push("(");
                self.predicate(a);
                self.push(op);
                self.predicate(b);
                self.push(")");
            }
            Predicate::Not(inner) => {
                self.push("NOT (");
                self.predicate(inner);
                self.push(")");
            }
        }
    }
}

#[must_use]
pub fn render(query: &SelectQuery) -> RenderedQuery {
    let mut w = QueryWriter::default();
    let root = query.root_alias.as_str();
    let distinct = if query.distinct { "DISTINCT " } else { "" };
    w.push("SELECT ");
    match &query.selection {
        Selection::Entity => w.push(&format!("{distinct}{root}")),
        Selection::Count { distinct: d } => {
            w.push(&format!("COUNT({}{root})", if *d { "DISTINCT " } else { "" }));
        }
        Selection::Ids => w.push(&format!("{distinct}{root}.{}", query.id_field)),
        Selection::Values(columns) => {
            let cols: Vec<String> = columns.iter().map(ToString::to_string).collect();
            w.push(&format!("{distinct}{}", cols.join(", ")));
        }
    }
    w.push(&format!(" FROM {} {root}", query.entity));
    for join in &query.joins {
        w.push(&format!(
            " {}{} {}.{} {}",
            join.join_type.keyword(),
            if join.fetch { " FETCH" } else { "" },
            join.parent,
            join.attribute.join("."),
            join.alias
        ));
    }
    if query.predicate != Predicate::True {
        w.push(" WHERE ");
        w.predicate(&query.predicate);
    }
    if !query.order_by.is_empty() {
        let terms: Vec<String> = query
            .order_by
            .iter()
            .map(|t| {
                let dir = match t.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{} {dir}", t.column)
            })
            .collect();
        w.push(&format!(" ORDER BY {}", terms.join(", ")));
    }
    if let Some(offset) = query.offset {
        w.push(&format!(" OFFSET {offset}"));
    }
    if let Some(limit) = query.limit {
        w.push(&format!(" LIMIT {limit}"));
    }
    RenderedQuery { text: w.text, params: w.params }
}
