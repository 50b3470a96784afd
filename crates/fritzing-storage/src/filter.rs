//! Query filters, dotted field paths and value ordering.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::{Document, StoreError};

/// Predicate over stored documents.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every document.
    All,
    /// Field equals `value`; an array field matches when any element equals it.
    /// A missing field only equals `null`.
    Eq { field: String, value: Value },
    /// String field matches `pattern`; an array field matches when any string
    /// element does.
    Matches { field: String, pattern: Regex },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive substring match. `needle` is taken literally.
    pub fn contains_ignore_case(field: impl Into<String>, needle: &str) -> Result<Self, StoreError> {
        let pattern = RegexBuilder::new(&regex::escape(needle))
            .case_insensitive(true)
            .build()
            .map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
        Ok(Self::Matches {
            field: field.into(),
            pattern,
        })
    }

    /// Conjunction that collapses trivial cases.
    pub fn and(mut filters: Vec<Filter>) -> Self {
        filters.retain(|f| !matches!(f, Filter::All));
        match filters.len() {
            0 => Filter::All,
            1 => filters.remove(0),
            _ => Filter::And(filters),
        }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => match lookup(doc, field) {
                Some(Value::Array(items)) => {
                    items.iter().any(|item| item == value) || matches!(value, Value::Array(v) if v == items)
                }
                Some(found) => found == value,
                None => value.is_null(),
            },
            Filter::Matches { field, pattern } => match lookup(doc, field) {
                Some(Value::String(s)) => pattern.is_match(s),
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| item.as_str().is_some_and(|s| pattern.is_match(s))),
                _ => false,
            },
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

/// Sort key for `find_many`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Pagination and ordering for `find_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: usize,
    /// `None` returns everything after `skip`.
    pub limit: Option<usize>,
    pub sort: Option<Sort>,
}

impl FindOptions {
    pub fn page(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: Some(limit),
            sort: None,
        }
    }

    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Resolve a dotted path (`properties.family`) inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Object(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Bool(_)) => 6,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// Order used for `FindOptions::sort` keys.
///
/// Strings that parse as RFC 3339 compare as instants, so timestamps with
/// differing fractional precision still sort chronologically. They order
/// before any string that does not parse, which keeps the order total when a
/// field mixes timestamps and free text.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (parse_timestamp(x), parse_timestamp(y)) {
                (Some(tx), Some(ty)) => tx.cmp(&ty).then_with(|| x.cmp(y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => x.cmp(y),
            }
        }
        _ => compare_plain(a, b),
    }
}

/// Plain order used by `aggregate_distinct`: strings compare lexically.
pub fn compare_plain(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
