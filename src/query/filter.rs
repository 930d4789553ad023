//! Constructors and structural helpers for [`Filter`].

use super::normalize::normalize_value;
use super::types::{CmpOp, Divisor, Filter, FilterKind};
use crate::errors::QueryError;
use bson::Bson;

impl Filter {
    /// Comparison leaf; string operands shaped like formatted numbers are normalized.
    #[must_use]
    pub fn compare(op: CmpOp, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Compare { op, path: path.into(), value: normalize_value(value.into()) }
    }

    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(CmpOp::Equal, path, value)
    }

    #[must_use]
    pub fn gt(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(CmpOp::Greater, path, value)
    }

    #[must_use]
    pub fn ge(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(CmpOp::GreaterOrEqual, path, value)
    }

    #[must_use]
    pub fn lt(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(CmpOp::Less, path, value)
    }

    #[must_use]
    pub fn le(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(CmpOp::LessOrEqual, path, value)
    }

    /// Case-sensitive LIKE; `%` matches any run, `_` a single character.
    #[must_use]
    pub fn like(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::like_with(path, pattern, true)
    }

    #[must_use]
    pub fn ilike(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::like_with(path, pattern, false)
    }

    #[must_use]
    pub fn like_with(
        path: impl Into<String>,
        pattern: impl Into<String>,
        case_sensitive: bool,
    ) -> Self {
        Self::Like { path: path.into(), pattern: pattern.into(), case_sensitive }
    }

    #[must_use]
    pub fn between(
        path: impl Into<String>,
        start: impl Into<Bson>,
        end: impl Into<Bson>,
    ) -> Self {
        Self::Between { path: path.into(), start: start.into(), end: end.into() }
    }

    #[must_use]
    pub fn in_values<V: Into<Bson>>(
        path: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In { path: path.into(), values: values.into_iter().map(Into::into).collect() }
    }

    #[must_use]
    pub fn contains(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Contains { path: path.into(), value: value.into() }
    }

    #[must_use]
    pub fn is_null(path: impl Into<String>) -> Self {
        Self::IsNull { path: path.into() }
    }

    /// # Errors
    /// A literal divisor of zero is rejected here rather than at execution time.
    pub fn modulo(
        path: impl Into<String>,
        divisor: Divisor,
        remainder: i64,
    ) -> Result<Self, QueryError> {
        if divisor == Divisor::Literal(0) {
            return Err(QueryError::validation("modulo divisor must not be zero"));
        }
        Ok(Self::Modulo { path: path.into(), divisor, remainder })
    }

    /// # Errors
    /// At least one child is required.
    pub fn and(children: Vec<Self>) -> Result<Self, QueryError> {
        if children.is_empty() {
            return Err(QueryError::validation("And requires at least one child"));
        }
        Ok(Self::And(children))
    }

    /// # Errors
    /// At least one child is required.
    pub fn or(children: Vec<Self>) -> Result<Self, QueryError> {
        if children.is_empty() {
            return Err(QueryError::validation("Or requires at least one child"));
        }
        Ok(Self::Or(children))
    }

    #[must_use]
    pub fn negate(child: Self) -> Self {
        Self::Not(Box::new(child))
    }

    #[must_use]
    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Compare { .. } => FilterKind::Compare,
            Self::Like { .. } => FilterKind::Like,
            Self::Between { .. } => FilterKind::Between,
            Self::In { .. } => FilterKind::In,
            Self::Contains { .. } => FilterKind::Contains,
            Self::IsNull { .. } => FilterKind::IsNull,
            Self::Modulo { .. } => FilterKind::Modulo,
            Self::And(_) => FilterKind::And,
            Self::Or(_) => FilterKind::Or,
            Self::Not(_) => FilterKind::Not,
        }
    }

    /// Re-checks the invariants the constructors enforce, for trees built from raw variants.
    ///
    /// # Errors
    /// Returns the first violation found in depth-first order.
    pub fn validate(&self) -> Result<(), QueryError> {
        match self {
            Self::And(children) | Self::Or(children) => {
                if children.is_empty() {
                    return Err(QueryError::validation(format!(
                        "{} requires at least one child",
                        self.kind()
                    )));
                }
                children.iter().try_for_each(Self::validate)
            }
            Self::Not(child) => child.validate(),
            Self::Modulo { divisor: Divisor::Literal(0), .. } => {
                Err(QueryError::validation("modulo divisor must not be zero"))
            }
            _ => Ok(()),
        }
    }

    /// Every property path the filter reads, in depth-first order, with repeats.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { path, .. }
            | Self::Like { path, .. }
            | Self::Between { path, .. }
            | Self::In { path, .. }
            | Self::Contains { path, .. }
            | Self::IsNull { path } => out.push(path),
            Self::Modulo { path, divisor, .. } => {
                out.push(path);
                if let Divisor::Property(p) = divisor {
                    out.push(p);
                }
            }
            Self::And(children) | Self::Or(children) => {
                children.iter().for_each(|c| c.collect_paths(out));
            }
            Self::Not(child) => child.collect_paths(out),
        }
    }
}
