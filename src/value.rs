//! Value semantics shared by in-memory evaluation and the reference backend.
//!
//! Both evaluation paths must agree, so every comparison in the crate goes through here.

use bson::Bson;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;

#[must_use]
pub fn is_null(v: Option<&Bson>) -> bool {
    matches!(v, None | Some(Bson::Null | Bson::Undefined))
}

/// Exact view of integer-typed values. Two of these never compare through `f64`.
fn as_exact_int(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

/// Numeric view of a value. Strings are not considered here.
#[must_use]
pub fn as_number(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

/// Integral view of a value, used by modulo arithmetic.
#[must_use]
pub fn as_integer(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        #[allow(clippy::cast_possible_truncation)]
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        Bson::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

fn numeric_text(v: &Bson) -> Option<f64> {
    match v {
        Bson::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Orders two non-null values. `None` means the pair is NULL or not comparable,
/// which both evaluation paths treat as UNKNOWN.
#[must_use]
pub fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if is_null(Some(a)) || is_null(Some(b)) {
        return None;
    }
    let int_text = |v: &Bson| match v {
        Bson::String(t) => t.parse::<i64>().ok(),
        _ => None,
    };
    match (as_exact_int(a), as_exact_int(b)) {
        (Some(x), Some(y)) => return Some(x.cmp(&y)),
        (Some(x), None) => {
            if let Some(y) = int_text(b) {
                return Some(x.cmp(&y));
            }
        }
        (None, Some(y)) => {
            if let Some(x) = int_text(a) {
                return Some(x.cmp(&y));
            }
        }
        (None, None) => {}
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => return Some(x.total_cmp(&y)),
        (Some(x), None) => return numeric_text(b).map(|y| x.total_cmp(&y)),
        (None, Some(y)) => return numeric_text(a).map(|x| x.total_cmp(&y)),
        (None, None) => {}
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            Some(x.timestamp_millis().cmp(&y.timestamp_millis()))
        }
        _ => None,
    }
}

/// Equality with the same NULL rules as [`compare`]; values of unrelated types are
/// unequal rather than unknown.
#[must_use]
pub fn equals(a: &Bson, b: &Bson) -> Option<bool> {
    if is_null(Some(a)) || is_null(Some(b)) {
        return None;
    }
    Some(compare(a, b).map_or_else(|| a == b, |o| o == Ordering::Equal))
}

/// Total order used for ORDER BY: NULLs first, then by value, unrelated types by type rank.
#[must_use]
pub fn sort_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (is_null(a), is_null(b)) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    let (Some(x), Some(y)) = (a, b) else {
        return Ordering::Equal;
    };
    compare(x, y).unwrap_or_else(|| type_rank(x).cmp(&type_rank(y)))
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::Null | Bson::Undefined => 0,
        Bson::Boolean(_) => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) => 3,
        Bson::DateTime(_) => 4,
        Bson::Array(_) => 5,
        Bson::Document(_) => 6,
        _ => 7,
    }
}

/// Hashable identity of a value, for DISTINCT over projected columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Num(OrderedFloat<f64>),
    Str(String),
    Date(i64),
    Other(String),
}

impl From<&Bson> for ValueKey {
    #[allow(clippy::cast_possible_truncation)]
    fn from(v: &Bson) -> Self {
        if is_null(Some(v)) {
            return Self::Null;
        }
        if let Some(i) = as_exact_int(v) {
            return Self::Int(i);
        }
        if let Some(n) = as_number(v) {
            // Integral floats share a key with the matching integer.
            if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                return Self::Int(n as i64);
            }
            return Self::Num(OrderedFloat(n));
        }
        match v {
            Bson::Boolean(b) => Self::Bool(*b),
            Bson::String(s) => Self::Str(s.clone()),
            Bson::DateTime(d) => Self::Date(d.timestamp_millis()),
            other => Self::Other(other.to_string()),
        }
    }
}
