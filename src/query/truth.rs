//! Three-valued leaf semantics shared by in-memory evaluation and backend execution.

use super::types::CmpOp;
use crate::errors::QueryError;
use crate::value::{as_integer, compare, equals, is_null};
use bson::Bson;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::LazyLock;

const LIKE_CACHE_CAPACITY: usize = 128;

static LIKE_CACHE: LazyLock<Mutex<LruCache<String, Regex>>> = LazyLock::new(|| {
    Mutex::new(LruCache::new(NonZeroUsize::new(LIKE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN)))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    #[must_use]
    pub fn from_bool(b: bool) -> Self {
        if b { Self::True } else { Self::False }
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::True, Self::True) => Self::True,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::False, Self::False) => Self::False,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn not(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }

    #[must_use]
    pub fn is_true(self) -> bool {
        self == Self::True
    }
}

impl From<Option<bool>> for Truth {
    fn from(v: Option<bool>) -> Self {
        v.map_or(Self::Unknown, Self::from_bool)
    }
}

#[must_use]
pub fn compare_truth(op: CmpOp, actual: &Bson, bound: &Bson) -> Truth {
    if op == CmpOp::Equal {
        return equals(actual, bound).into();
    }
    compare(actual, bound)
        .map(|o| match op {
            CmpOp::Equal => o == Ordering::Equal,
            CmpOp::Greater => o == Ordering::Greater,
            CmpOp::GreaterOrEqual => o != Ordering::Less,
            CmpOp::Less => o == Ordering::Less,
            CmpOp::LessOrEqual => o != Ordering::Greater,
        })
        .into()
}

#[must_use]
pub fn between_truth(actual: &Bson, start: &Bson, end: &Bson) -> Truth {
    compare_truth(CmpOp::GreaterOrEqual, actual, start)
        .and(compare_truth(CmpOp::LessOrEqual, actual, end))
}

#[must_use]
pub fn in_truth(actual: &Bson, values: &[Bson]) -> Truth {
    if values.is_empty() {
        return Truth::False;
    }
    values.iter().fold(Truth::False, |acc, v| acc.or(equals(actual, v).into()))
}

/// Membership in a collection value. Document elements are matched by `id_field` when given.
#[must_use]
pub fn member_truth(collection: &Bson, value: &Bson, id_field: Option<&str>) -> Truth {
    if is_null(Some(value)) {
        return Truth::Unknown;
    }
    let Bson::Array(items) = collection else {
        return Truth::False;
    };
    let hit = items.iter().any(|item| {
        let key = match (item, id_field) {
            (Bson::Document(d), Some(f)) => d.get(f).unwrap_or(&Bson::Null),
            _ => item,
        };
        equals(key, value) == Some(true)
    });
    Truth::from_bool(hit)
}

/// # Errors
/// A resolved divisor of zero is a validation error, never a silent mismatch.
pub fn modulo_truth(actual: &Bson, divisor: &Bson, remainder: i64) -> Result<Truth, QueryError> {
    let d = as_integer(divisor);
    if d == Some(0) {
        return Err(QueryError::validation("modulo divisor resolved to zero"));
    }
    let (Some(v), Some(d)) = (as_integer(actual), d) else {
        return Ok(Truth::Unknown);
    };
    Ok(Truth::from_bool(v.checked_rem(d) == Some(remainder)))
}

/// SQL LIKE over strings. Case-insensitive matching folds both sides to lower case.
#[must_use]
pub fn like_truth(actual: &Bson, pattern: &str, case_sensitive: bool) -> Truth {
    let Bson::String(s) = actual else {
        return Truth::Unknown;
    };
    if case_sensitive {
        Truth::from_bool(like_matches(s, pattern))
    } else {
        Truth::from_bool(like_matches(&s.to_lowercase(), &pattern.to_lowercase()))
    }
}

fn like_matches(s: &str, pattern: &str) -> bool {
    let mut cache = LIKE_CACHE.lock();
    if let Some(re) = cache.get(pattern) {
        return re.is_match(s);
    }
    match Regex::new(&like_to_regex(pattern)) {
        Ok(re) => {
            let hit = re.is_match(s);
            cache.put(pattern.to_string(), re);
            hit
        }
        Err(e) => {
            log::warn!("unusable LIKE pattern {pattern:?}: {e}");
            false
        }
    }
}

fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '%' | '_' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kleene_connectives() {
        use Truth::{False, True, Unknown};
        assert_eq!(Unknown.and(False), False);
        assert_eq!(Unknown.and(True), Unknown);
        assert_eq!(Unknown.or(True), True);
        assert_eq!(Unknown.not(), Unknown);
    }

    #[test]
    fn between_is_inclusive() {
        let lo = Bson::Int32(1);
        let hi = Bson::Int32(5);
        assert!(between_truth(&Bson::Int32(1), &lo, &hi).is_true());
        assert!(between_truth(&Bson::Int32(5), &lo, &hi).is_true());
        assert_eq!(between_truth(&Bson::Int32(6), &lo, &hi), Truth::False);
        assert_eq!(between_truth(&Bson::Null, &lo, &hi), Truth::Unknown);
    }

    #[test]
    fn empty_in_is_false_even_for_null() {
        assert_eq!(in_truth(&Bson::Null, &[]), Truth::False);
        assert_eq!(in_truth(&Bson::Int32(2), &[Bson::Int32(1), Bson::Null]), Truth::Unknown);
        assert!(in_truth(&Bson::Int32(1), &[Bson::Int64(1)]).is_true());
    }

    #[test]
    fn like_wildcards_and_case() {
        let s = Bson::String("Hello.World".into());
        assert!(like_truth(&s, "Hello%", true).is_true());
        assert!(like_truth(&s, "Hello_World", true).is_true());
        assert_eq!(like_truth(&s, "hello%", true), Truth::False);
        assert!(like_truth(&s, "hello%", false).is_true());
        assert_eq!(like_truth(&s, "Hello.W", true), Truth::False);
        assert_eq!(like_truth(&Bson::Int32(1), "%", true), Truth::Unknown);
    }

    #[test]
    fn modulo_rejects_zero_divisor() {
        assert!(modulo_truth(&Bson::Int32(7), &Bson::Int32(0), 1).is_err());
        assert!(modulo_truth(&Bson::Int32(7), &Bson::Int32(3), 1).unwrap().is_true());
        assert_eq!(modulo_truth(&Bson::Null, &Bson::Int32(3), 1).unwrap(), Truth::Unknown);
    }

    #[test]
    fn membership_by_id_field() {
        let docs = Bson::Array(vec![Bson::Document(bson::doc! {"id": 4})]);
        assert!(member_truth(&docs, &Bson::Int64(4), Some("id")).is_true());
        assert_eq!(member_truth(&Bson::Null, &Bson::Int64(4), None), Truth::False);
    }
}
