//! Typed filter predicates and value expressions.
//!
//! Config strings are parsed once, against the declared attributes, into a
//! small closed tree. Nothing is evaluated from free text at draw time.

use crate::{AttrDef, AttrKind, Item};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PredicateError {
    #[error("empty filter expression")]
    Empty,
    #[error("unknown attribute `{0}`")]
    UnknownAttr(String),
    #[error("attribute `{key}` is a {kind:?} and cannot be used in `{expr}`")]
    KindMismatch {
        key: String,
        kind: AttrKind,
        expr: String,
    },
    #[error("invalid number in `{0}`")]
    InvalidNumber(String),
    #[error("cannot parse filter `{0}`")]
    Syntax(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    FlagSet(String),
    FlagClear(String),
    Equals(String, i64),
    GreaterThan(String, i64),
    LessThan(String, i64),
    MarkedForDeletion,
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Predicate::FlagSet(key) => item.flag(key),
            Predicate::FlagClear(key) => !item.flag(key),
            Predicate::Equals(key, value) => item.count(key) == *value,
            Predicate::GreaterThan(key, value) => item.count(key) > *value,
            Predicate::LessThan(key, value) => item.count(key) < *value,
            Predicate::MarkedForDeletion => item.marked_for_deletion,
            Predicate::Not(inner) => !inner.matches(item),
        }
    }

    pub fn matches_all(predicates: &[Predicate], item: &Item) -> bool {
        predicates.iter().all(|predicate| predicate.matches(item))
    }

    /// Accepted forms: `key`, `!key`, `not <expr>`, `key == n`, `key > n`,
    /// `key < n`, `key >= n`, `key <= n`, `key != n`, and `deleted`.
    pub fn parse(expr: &str, attrs: &[AttrDef]) -> Result<Self, PredicateError> {
        let text = expr.trim();
        if text.is_empty() {
            return Err(PredicateError::Empty);
        }
        if let Some(rest) = text.strip_prefix('!') {
            return Self::parse(rest, attrs).map(Self::negate);
        }
        if let Some(rest) = text.strip_prefix("not ") {
            return Self::parse(rest, attrs).map(Self::negate);
        }
        if text == "deleted" {
            return Ok(Predicate::MarkedForDeletion);
        }

        for op in ["==", "!=", ">=", "<=", ">", "<"] {
            let Some((lhs, rhs)) = text.split_once(op) else {
                continue;
            };
            let key = lhs.trim();
            lookup(attrs, key, AttrKind::Count, text)?;
            let value: i64 = rhs
                .trim()
                .parse()
                .map_err(|_| PredicateError::InvalidNumber(text.to_string()))?;
            let key = key.to_string();
            return Ok(match op {
                "==" => Predicate::Equals(key, value),
                "!=" => Predicate::Not(Box::new(Predicate::Equals(key, value))),
                ">" => Predicate::GreaterThan(key, value),
                "<" => Predicate::LessThan(key, value),
                ">=" => Predicate::Not(Box::new(Predicate::LessThan(key, value))),
                _ => Predicate::Not(Box::new(Predicate::GreaterThan(key, value))),
            });
        }

        if text.contains(char::is_whitespace) {
            return Err(PredicateError::Syntax(text.to_string()));
        }
        lookup(attrs, text, AttrKind::Flag, text)?;
        Ok(Predicate::FlagSet(text.to_string()))
    }

    fn negate(self) -> Self {
        match self {
            Predicate::FlagSet(key) => Predicate::FlagClear(key),
            Predicate::FlagClear(key) => Predicate::FlagSet(key),
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }
}

fn lookup<'a>(
    attrs: &'a [AttrDef],
    key: &str,
    expected: AttrKind,
    expr: &str,
) -> Result<&'a AttrDef, PredicateError> {
    let def = attrs
        .iter()
        .find(|def| def.key == key)
        .ok_or_else(|| PredicateError::UnknownAttr(key.to_string()))?;
    if def.kind != expected {
        return Err(PredicateError::KindMismatch {
            key: key.to_string(),
            kind: def.kind,
            expr: expr.to_string(),
        });
    }
    Ok(def)
}

/// Maps an item to an integer score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueExpr {
    Const(i64),
    Attr(String),
    Sum(Vec<ValueExpr>),
    Product(Vec<ValueExpr>),
    Max(Vec<ValueExpr>),
}

impl ValueExpr {
    pub fn eval(&self, item: &Item) -> i64 {
        match self {
            ValueExpr::Const(value) => *value,
            ValueExpr::Attr(key) => item.count(key),
            ValueExpr::Sum(terms) => terms
                .iter()
                .fold(0i64, |acc, term| acc.saturating_add(term.eval(item))),
            ValueExpr::Product(terms) => terms
                .iter()
                .fold(1i64, |acc, term| acc.saturating_mul(term.eval(item))),
            ValueExpr::Max(terms) => terms.iter().map(|term| term.eval(item)).max().unwrap_or(0),
        }
    }

    /// Rejects references to undeclared attributes.
    pub fn validate(&self, attrs: &[AttrDef]) -> Result<(), PredicateError> {
        match self {
            ValueExpr::Const(_) => Ok(()),
            ValueExpr::Attr(key) => {
                if attrs.iter().any(|def| &def.key == key) {
                    Ok(())
                } else {
                    Err(PredicateError::UnknownAttr(key.clone()))
                }
            }
            ValueExpr::Sum(terms) | ValueExpr::Product(terms) | ValueExpr::Max(terms) => {
                terms.iter().try_for_each(|term| term.validate(attrs))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttrValue;

    fn attrs() -> Vec<AttrDef> {
        vec![AttrDef::from_key("favorite"), AttrDef::from_key("num_views")]
    }

    #[test]
    fn parses_flag_and_negation() {
        let attrs = attrs();
        assert_eq!(
            Predicate::parse("favorite", &attrs),
            Ok(Predicate::FlagSet("favorite".to_string()))
        );
        assert_eq!(
            Predicate::parse("!favorite", &attrs),
            Ok(Predicate::FlagClear("favorite".to_string()))
        );
        assert_eq!(
            Predicate::parse("not favorite", &attrs),
            Ok(Predicate::FlagClear("favorite".to_string()))
        );
    }

    #[test]
    fn parses_comparisons() {
        let attrs = attrs();
        assert_eq!(
            Predicate::parse("num_views > 3", &attrs),
            Ok(Predicate::GreaterThan("num_views".to_string(), 3))
        );
        assert_eq!(
            Predicate::parse("num_views==0", &attrs),
            Ok(Predicate::Equals("num_views".to_string(), 0))
        );
        let at_least = Predicate::parse("num_views >= 2", &attrs).expect("parse");
        let item = Item::new(1, "jpg").with_attr("num_views", AttrValue::Count(2));
        assert!(at_least.matches(&item));
        assert!(!Predicate::parse("num_views < 2", &attrs)
            .expect("parse")
            .matches(&item));
    }

    #[test]
    fn rejects_unknown_and_mismatched_keys() {
        let attrs = attrs();
        assert_eq!(
            Predicate::parse("nope", &attrs),
            Err(PredicateError::UnknownAttr("nope".to_string()))
        );
        assert!(matches!(
            Predicate::parse("favorite > 1", &attrs),
            Err(PredicateError::KindMismatch { .. })
        ));
        assert!(matches!(
            Predicate::parse("num_views", &attrs),
            Err(PredicateError::KindMismatch { .. })
        ));
        assert_eq!(
            Predicate::parse("num_views > x", &attrs),
            Err(PredicateError::InvalidNumber("num_views > x".to_string()))
        );
    }

    #[test]
    fn value_expr_from_json() {
        let expr: ValueExpr = serde_json::from_str(
            r#"{"sum":[{"attr":"num_views"},{"product":[{"attr":"favorite"},{"const":5}]}]}"#,
        )
        .expect("parse expr");
        let item = Item::new(1, "jpg")
            .with_attr("num_views", AttrValue::Count(2))
            .with_attr("favorite", AttrValue::Flag(true));
        assert_eq!(expr.eval(&item), 7);
        assert!(expr.validate(&attrs()).is_ok());
        assert!(ValueExpr::Attr("nope".to_string()).validate(&attrs()).is_err());
    }
}
