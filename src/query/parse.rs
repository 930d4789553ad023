use crate::errors::QueryError;
use bson::Bson;
use serde::{Deserialize, Serialize};

use super::types::{
    CmpOp, Divisor, FetchJoinInformation, Filter, JoinType, SortDirection, SortOrder, SortOrders,
};

fn case_sensitive_default() -> bool {
    true
}

// Serde-facing structures for safe JSON parsing of filters. Variant order matters for the
// untagged representation: `Cmp` has only optional operators and must stay last. Unknown keys
// are rejected so a leaf mixing two shapes fails instead of losing one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum FilterSerde {
    And {
        #[serde(rename = "$and")]
        and: Vec<FilterSerde>,
    },
    Or {
        #[serde(rename = "$or")]
        or: Vec<FilterSerde>,
    },
    Not {
        #[serde(rename = "$not")]
        not: Box<FilterSerde>,
    },
    Like {
        field: String,
        #[serde(rename = "$like")]
        pattern: String,
        #[serde(default = "case_sensitive_default")]
        case_sensitive: bool,
    },
    Between {
        field: String,
        #[serde(rename = "$between")]
        bounds: Vec<Bson>,
    },
    In {
        field: String,
        #[serde(rename = "$in")]
        in_vals: Vec<Bson>,
    },
    Contains {
        field: String,
        #[serde(rename = "$contains")]
        value: Bson,
    },
    Null {
        field: String,
        #[serde(rename = "$null")]
        is_null: bool,
    },
    Mod {
        field: String,
        #[serde(rename = "$mod")]
        modulo: ModSerde,
    },
    Cmp {
        field: String,
        #[serde(default, rename = "$eq")]
        eq: Option<Bson>,
        #[serde(default, rename = "$gt")]
        gt: Option<Bson>,
        #[serde(default, rename = "$gte")]
        gte: Option<Bson>,
        #[serde(default, rename = "$lt")]
        lt: Option<Bson>,
        #[serde(default, rename = "$lte")]
        lte: Option<Bson>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModSerde {
    pub divisor: DivisorSerde,
    pub remainder: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DivisorSerde {
    Literal(i64),
    Property(String),
}

impl TryFrom<FilterSerde> for Filter {
    type Error = QueryError;
    fn try_from(fs: FilterSerde) -> Result<Self, Self::Error> {
        use FilterSerde as FS;
        Ok(match fs {
            FS::And { and } => {
                Self::and(and.into_iter().map(Self::try_from).collect::<Result<_, _>>()?)?
            }
            FS::Or { or } => Self::or(or.into_iter().map(Self::try_from).collect::<Result<_, _>>()?)?,
            FS::Not { not } => Self::negate(Self::try_from(*not)?),
            FS::Like { field, pattern, case_sensitive } => {
                Self::like_with(field, pattern, case_sensitive)
            }
            FS::Between { field, bounds } => {
                let [start, end]: [Bson; 2] = bounds.try_into().map_err(|_| {
                    QueryError::validation("$between takes exactly two bounds")
                })?;
                Self::between(field, start, end)
            }
            FS::In { field, in_vals } => Self::in_values(field, in_vals),
            FS::Contains { field, value } => Self::contains(field, value),
            FS::Null { field, is_null } => {
                if is_null {
                    Self::is_null(field)
                } else {
                    Self::negate(Self::is_null(field))
                }
            }
            FS::Mod { field, modulo } => {
                let divisor = match modulo.divisor {
                    DivisorSerde::Literal(d) => Divisor::Literal(d),
                    DivisorSerde::Property(p) => Divisor::Property(p),
                };
                Self::modulo(field, divisor, modulo.remainder)?
            }
            FS::Cmp { field, eq, gt, gte, lt, lte } => {
                // Several operators on one field all apply: `{"$gt":1,"$lt":9}` is a range.
                let mut parts: Vec<Self> = [
                    (CmpOp::Equal, eq),
                    (CmpOp::Greater, gt),
                    (CmpOp::GreaterOrEqual, gte),
                    (CmpOp::Less, lt),
                    (CmpOp::LessOrEqual, lte),
                ]
                .into_iter()
                .filter_map(|(op, v)| v.map(|v| Self::compare(op, field.clone(), v)))
                .collect();
                match parts.len() {
                    0 => return Err(QueryError::validation("No comparison operator provided")),
                    1 => parts.remove(0),
                    _ => Self::and(parts)?,
                }
            }
        })
    }
}

/// # Errors
/// Returns an error if the JSON string cannot be parsed into a filter structure.
pub fn parse_filter_json(json: &str) -> Result<Filter, QueryError> {
    let fs: FilterSerde = serde_json::from_str(json)?;
    Filter::try_from(fs)
}

impl SortOrders {
    /// Parses `name:desc,age` style specs. Directions are case-insensitive and default to
    /// ascending; an empty spec means unsorted.
    ///
    /// # Errors
    /// Empty property names and unknown direction tokens.
    pub fn parse(spec: &str) -> Result<Self, QueryError> {
        let mut out = Self::none();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (property, direction) = match part.split_once(':') {
                Some((p, d)) => (p.trim(), d.trim().parse::<SortDirection>()?),
                None => (part, SortDirection::Asc),
            };
            if property.is_empty() {
                return Err(QueryError::validation(format!("sort term `{part}` has no property")));
            }
            out = out.then(SortOrder { property: property.to_string(), direction });
        }
        Ok(out)
    }
}

/// Parses `orders:inner,address` style fetch join lists; the join type defaults to left.
///
/// # Errors
/// Empty paths and unknown join types.
pub fn parse_fetch_joins(spec: &str) -> Result<Vec<FetchJoinInformation>, QueryError> {
    spec.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| {
            let (path, join_type) = match part.split_once(':') {
                Some((p, t)) => (p.trim(), t.trim().parse::<JoinType>()?),
                None => (part, JoinType::Left),
            };
            if path.is_empty() {
                return Err(QueryError::validation(format!("fetch join `{part}` has no path")));
            }
            Ok(FetchJoinInformation::with_type(path, join_type))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_filters() {
        let f = parse_filter_json(
            r#"{"$and":[
                {"field":"name","$like":"A%","case_sensitive":false},
                {"$not":{"field":"age","$gte":30}},
                {"field":"tags","$contains":"vip"},
                {"field":"age","$between":[1,9]},
                {"field":"age","$mod":{"divisor":"step","remainder":1}},
                {"field":"nick","$null":false}
            ]}"#,
        )
        .unwrap();
        let expected = Filter::and(vec![
            Filter::ilike("name", "A%"),
            Filter::negate(Filter::ge("age", 30)),
            Filter::contains("tags", "vip"),
            Filter::between("age", 1, 9),
            Filter::modulo("age", Divisor::Property("step".into()), 1).unwrap(),
            Filter::negate(Filter::is_null("nick")),
        ])
        .unwrap();
        assert_eq!(f, expected);
    }

    #[test]
    fn comparison_operands_are_normalized() {
        let f = parse_filter_json(r#"{"field":"price","$eq":"1.234,5"}"#).unwrap();
        assert_eq!(f, Filter::eq("price", "1234.5"));
        let f = parse_filter_json(r#"{"field":"name","$like":"x"}"#).unwrap();
        assert_eq!(f, Filter::like("name", "x"));
    }

    #[test]
    fn rejects_bad_filters() {
        assert!(parse_filter_json(r#"{"$and":[]}"#).is_err());
        assert!(parse_filter_json(r#"{"field":"a"}"#).is_err());
        assert!(parse_filter_json(r#"{"field":"a","$between":[1]}"#).is_err());
        assert!(matches!(
            parse_filter_json(r#"{"field":"a","$mod":{"divisor":0,"remainder":1}}"#),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn several_operators_on_one_field_form_a_range() {
        let f = parse_filter_json(r#"{"field":"age","$gt":10,"$lt":20}"#).unwrap();
        assert_eq!(f, Filter::and(vec![Filter::gt("age", 10), Filter::lt("age", 20)]).unwrap());
    }

    #[test]
    fn leaves_mixing_shapes_or_unknown_keys_are_rejected() {
        assert!(parse_filter_json(r#"{"field":"a","$like":"x","$eq":1}"#).is_err());
        assert!(parse_filter_json(r#"{"field":"a","$eq":1,"$ne":2}"#).is_err());
        assert!(parse_filter_json(r#"{"field":"a","$in":[1],"case_sensitive":true}"#).is_err());
        assert!(parse_filter_json(r#"{"field":"a","$mod":{"divisor":2,"remainder":1,"x":0}}"#).is_err());
    }

    #[test]
    fn sort_and_join_specs() {
        let s = SortOrders::parse("name:DESC, age").unwrap();
        assert_eq!(s, SortOrders::none().then(SortOrder::desc("name")).then(SortOrder::asc("age")));
        assert!(SortOrders::parse("").unwrap().is_empty());
        assert!(SortOrders::parse("name:AS").is_err());
        let j = parse_fetch_joins("orders:Inner,address").unwrap();
        assert_eq!(j[0], FetchJoinInformation::with_type("orders", JoinType::Inner));
        assert_eq!(j[1].join_type, JoinType::Left);
        let fj: FetchJoinInformation = serde_json::from_str(r#"{"path":"orders"}"#).unwrap();
        assert_eq!(fj.join_type, JoinType::Left);
        let so: SortOrder = serde_json::from_str(r#"{"property":"age","direction":"desc"}"#).unwrap();
        assert_eq!(so.direction, SortDirection::Desc);
    }
}
