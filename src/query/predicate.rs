//! Filter predicates.
//!
//! Predicates are built from request filters and can be rendered to SQL with
//! bound placeholders or evaluated directly against a stored row.

use crate::entity::Document;
use serde_json::{Number, Value};
use std::fmt;

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Number(Number),
    Boolean(bool),
}

impl SqlParam {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (SqlParam::Text(expected), Value::String(actual)) => expected == actual,
            (SqlParam::Text(expected), Value::Number(actual)) => expected == &actual.to_string(),
            (SqlParam::Number(expected), Value::Number(actual)) => {
                match (expected.as_i64(), actual.as_i64()) {
                    (Some(left), Some(right)) => left == right,
                    _ => expected.as_f64() == actual.as_f64(),
                }
            }
            (SqlParam::Boolean(expected), Value::Bool(actual)) => expected == actual,
            _ => false,
        }
    }
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::Text(text) => write!(f, "'{}'", text.replace('\'', "''")),
            SqlParam::Number(number) => write!(f, "{}", number),
            SqlParam::Boolean(flag) => write!(f, "{}", flag),
        }
    }
}

/// A row filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact match.
    Eq { field: String, value: SqlParam },
    /// Case-insensitive pattern match. `pattern` is stored upper-cased and
    /// uses `%` for any run of characters and `_` for exactly one.
    Like { field: String, pattern: String },
    /// Inclusion in a set.
    In { field: String, values: Vec<SqlParam> },
    /// All of the inner predicates.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate against a stored row. Missing and `null` columns never match.
    pub fn matches(&self, row: &Document) -> bool {
        match self {
            Predicate::Eq { field, value } => column(row, field).is_some_and(|v| value.matches(v)),
            Predicate::Like { field, pattern } => column(row, field)
                .and_then(comparable_text)
                .is_some_and(|text| like_matches(&text.to_uppercase(), pattern)),
            Predicate::In { field, values } => column(row, field)
                .is_some_and(|v| values.iter().any(|candidate| candidate.matches(v))),
            Predicate::And(inner) => inner.iter().all(|predicate| predicate.matches(row)),
        }
    }

    /// Render as SQL, appending bound values to `params`.
    pub fn render(&self, params: &mut Vec<SqlParam>) -> String {
        match self {
            Predicate::Eq { field, value } => {
                params.push(value.clone());
                format!("e.{} = ${}", field, params.len())
            }
            Predicate::Like { field, pattern } => {
                params.push(SqlParam::Text(pattern.clone()));
                format!("UPPER(e.{}) LIKE ${}", field, params.len())
            }
            Predicate::In { field, values } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|value| {
                        params.push(value.clone());
                        format!("${}", params.len())
                    })
                    .collect();
                format!("e.{} IN ({})", field, placeholders.join(", "))
            }
            Predicate::And(inner) => inner
                .iter()
                .map(|predicate| predicate.render(params))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

fn column<'a>(row: &'a Document, field: &str) -> Option<&'a Value> {
    row.get(field).filter(|value| !value.is_null())
}

fn comparable_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// SQL `LIKE` matching with `%` and `_` wildcards.
pub fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, from)) = backtrack {
            p = star + 1;
            t = from + 1;
            backtrack = Some((star, from + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}
