//! Dynamic query construction.
//!
//! Turns request sorters and filters into a [`SelectQuery`] for one entity
//! type. Filter values follow a small fixed grammar:
//!
//! | Value            | Meaning                                   |
//! |------------------|-------------------------------------------|
//! | `[v]`            | brackets stripped, then as below          |
//! | contains `%`     | case-insensitive partial match            |
//! | `a\|b\|c`        | inclusion set                             |
//! | anything else    | equality                                  |
//!
//! The `masterEntityId` pseudo-filter expands into real key filters through
//! the type's master key mapping before any of the above applies. Values are
//! always bound as parameters, typed by the field's declared kind.

pub mod predicate;

pub use predicate::{Predicate, SqlParam, like_matches};

use crate::entity::{Document, EntityType, FieldKind, value_to_key};
use log::debug;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Filter name expanded through the master key mapping.
pub const MASTER_ENTITY_ID_FILTER: &str = "masterEntityId";

/// Errors raised while building a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown field '{field}' for entity type '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("Invalid sort direction '{direction}' for field '{field}'")]
    InvalidDirection { field: String, direction: String },

    #[error("Value '{value}' is not a valid {kind} value for field '{field}'")]
    InvalidValue {
        field: String,
        value: String,
        kind: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = ();

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderTerm {
    /// Compare two rows on this term. Missing values sort first.
    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        let ordering = compare_values(left.get(&self.field), right.get(&self.field));
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

/// A typed, parameterized select over one entity type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderTerm>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// Restrict to one page.
    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Document) -> bool {
        self.predicate
            .as_ref()
            .is_none_or(|predicate| predicate.matches(row))
    }

    /// Sort rows by the order terms, earlier terms taking precedence.
    pub fn sort(&self, rows: &mut [Document]) {
        rows.sort_by(|left, right| {
            self.order
                .iter()
                .map(|term| term.compare(left, right))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }
}

/// SQL text for a select, with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub find: String,
    pub count: String,
    pub params: Vec<SqlParam>,
}

/// Builds queries for one entity type.
pub struct QueryBuilder<'a> {
    entity_type: &'a EntityType,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(entity_type: &'a EntityType) -> Self {
        Self { entity_type }
    }

    /// Build a select from ordered sorter and filter pairs.
    pub fn select(
        &self,
        sorters: &[(String, String)],
        filters: &[(String, String)],
    ) -> Result<SelectQuery, QueryError> {
        Ok(SelectQuery {
            predicate: self.predicate(filters)?,
            order: self.order_terms(sorters)?,
            offset: 0,
            limit: None,
        })
    }

    /// Ordering terms, preserving sorter order.
    pub fn order_terms(&self, sorters: &[(String, String)]) -> Result<Vec<OrderTerm>, QueryError> {
        sorters
            .iter()
            .map(|(field, direction)| {
                self.kind_of(field)?;
                let direction =
                    direction
                        .parse()
                        .map_err(|()| QueryError::InvalidDirection {
                            field: field.clone(),
                            direction: direction.clone(),
                        })?;
                Ok(OrderTerm {
                    field: field.clone(),
                    direction,
                })
            })
            .collect()
    }

    /// Replace a `masterEntityId` filter with the key filters it stands for.
    ///
    /// A composite id is split on `|` and zipped with the pipe-delimited key
    /// mapping; empty mapping segments are skipped. When the segment counts
    /// differ, or the type declares no mapping, the filter is dropped.
    pub fn expand_filters(&self, filters: &[(String, String)]) -> Vec<(String, String)> {
        let mut expanded: Vec<(String, String)> = filters
            .iter()
            .filter(|(field, _)| field != MASTER_ENTITY_ID_FILTER)
            .cloned()
            .collect();

        let Some((_, master_id)) = filters
            .iter()
            .find(|(field, _)| field == MASTER_ENTITY_ID_FILTER)
        else {
            return expanded;
        };

        let Some(mapping) = self.entity_type.master_key_mapping() else {
            debug!(
                "{} has no master key mapping; ignoring masterEntityId filter",
                self.entity_type.name()
            );
            return expanded;
        };

        let ids: Vec<&str> = master_id.split('|').collect();
        let keys: Vec<&str> = mapping.split('|').collect();
        if ids.len() != keys.len() {
            debug!(
                "masterEntityId '{}' does not fit mapping '{}'",
                master_id, mapping
            );
            return expanded;
        }

        for (key, id) in keys.into_iter().zip(ids) {
            if key.is_empty() {
                continue;
            }
            match expanded.iter_mut().find(|(field, _)| field == key) {
                Some(existing) => existing.1 = id.to_string(),
                None => expanded.push((key.to_string(), id.to_string())),
            }
        }

        expanded
    }

    /// The combined filter predicate, or `None` when nothing filters.
    pub fn predicate(&self, filters: &[(String, String)]) -> Result<Option<Predicate>, QueryError> {
        let mut predicates = Vec::new();

        for (field, raw) in self.expand_filters(filters) {
            if raw.is_empty() {
                continue;
            }
            let kind = self.kind_of(&field)?;
            let value = strip_brackets(&raw);

            let predicate = if value.contains('%') {
                Predicate::Like {
                    field,
                    pattern: value.to_uppercase(),
                }
            } else if value.contains('|') {
                let values = value
                    .split('|')
                    .map(|item| typed_param(&field, kind, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Predicate::In { field, values }
            } else {
                let value = typed_param(&field, kind, value)?;
                Predicate::Eq { field, value }
            };
            predicates.push(predicate);
        }

        Ok(match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::And(predicates)),
        })
    }

    /// Render find and count statements.
    pub fn to_sql(&self, query: &SelectQuery) -> SqlStatement {
        let mut params = Vec::new();
        let where_clause = query
            .predicate
            .as_ref()
            .map(|predicate| format!(" WHERE {}", predicate.render(&mut params)))
            .unwrap_or_default();

        let order_clause = if query.order.is_empty() {
            String::new()
        } else {
            let terms: Vec<String> = query
                .order
                .iter()
                .map(|term| format!("e.{} {}", term.field, term.direction))
                .collect();
            format!(" ORDER BY {}", terms.join(", "))
        };

        let page_clause = match query.limit {
            Some(limit) => format!(" LIMIT {} OFFSET {}", limit, query.offset),
            None if query.offset > 0 => format!(" OFFSET {}", query.offset),
            None => String::new(),
        };

        let table = self.entity_type.table();
        let statement = SqlStatement {
            find: format!("SELECT e.* FROM {} e{}{}{}", table, where_clause, order_clause, page_clause),
            count: format!("SELECT COUNT(*) FROM {} e{}", table, where_clause),
            params,
        };
        debug!("find query: {}", statement.find);
        debug!("count query: {}", statement.count);
        statement
    }

    /// Statement loading a single record by key.
    pub fn find_by_id_sql(&self, id: &Value) -> Result<SqlStatement, QueryError> {
        let id_field = self.entity_type.id_field();
        let param = typed_param(&id_field.name, id_field.kind, &value_to_key(id))?;
        let table = self.entity_type.table();
        Ok(SqlStatement {
            find: format!("SELECT e.* FROM {} e WHERE e.{} = $1", table, id_field.name),
            count: format!("SELECT COUNT(*) FROM {} e WHERE e.{} = $1", table, id_field.name),
            params: vec![param],
        })
    }

    fn kind_of(&self, field: &str) -> Result<FieldKind, QueryError> {
        self.entity_type
            .column_kind(field)
            .ok_or_else(|| QueryError::UnknownField {
                entity: self.entity_type.name().to_string(),
                field: field.to_string(),
            })
    }
}

fn strip_brackets(value: &str) -> &str {
    value
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(value)
}

fn typed_param(field: &str, kind: FieldKind, raw: &str) -> Result<SqlParam, QueryError> {
    let invalid = || QueryError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        kind: kind.label(),
    };

    match kind {
        FieldKind::Text | FieldKind::Temporal => Ok(SqlParam::Text(raw.to_string())),
        FieldKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(SqlParam::Boolean(true)),
            "false" => Ok(SqlParam::Boolean(false)),
            _ => Err(invalid()),
        },
        FieldKind::Numeric => parse_number(raw).map(SqlParam::Number).ok_or_else(invalid),
        // Keys of text-keyed masters bind as text.
        FieldKind::ForeignKey => Ok(parse_number(raw)
            .map(SqlParam::Number)
            .unwrap_or_else(|| SqlParam::Text(raw.to_string()))),
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    trimmed
        .parse::<i64>()
        .map(Number::from)
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().and_then(Number::from_f64))
}
