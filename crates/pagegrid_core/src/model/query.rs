//! Filter, sort and request payloads for reader services.

use super::{Record, RecordId, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Predicate over record values, evaluated by the reader service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, Value),
    /// Case-insensitive substring match on the display form of the value.
    Contains(String, String),
    /// Inclusive range; either bound may be open.
    Range {
        property: String,
        min: Option<Value>,
        max: Option<Value>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        let value_of = |property: &str| record.value(property).cloned().unwrap_or_default();
        match self {
            Self::Eq(property, expected) => value_of(property) == *expected,
            Self::Contains(property, needle) => value_of(property)
                .to_string()
                .to_lowercase()
                .contains(needle.to_lowercase().as_str()),
            Self::Range { property, min, max } => {
                let value = value_of(property);
                let above = min
                    .as_ref()
                    .map_or(true, |min| value.compare(min) != Ordering::Less);
                let below = max
                    .as_ref()
                    .map_or(true, |max| value.compare(max) != Ordering::Greater);
                above && below
            }
            Self::And(filters) => filters.iter().all(|filter| filter.matches(record)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(record)),
            Self::Not(filter) => !filter.matches(record),
        }
    }
}

/// One sort criterion; earlier keys take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub property: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn ascending(property: &str) -> Self {
        Self {
            property: property.to_string(),
            ascending: true,
        }
    }

    pub fn descending(property: &str) -> Self {
        Self {
            property: property.to_string(),
            ascending: false,
        }
    }

    /// Compare two records by this key alone.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let null = Value::Null;
        let left = a.value(&self.property).unwrap_or(&null);
        let right = b.value(&self.property).unwrap_or(&null);
        let ordering = left.compare(right);
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Window read against a reader service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReadRequest {
    pub parent_keys: Vec<RecordId>,
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    pub offset: usize,
    pub limit: usize,
    pub parameter: Option<Value>,
}

/// Total-row-count request against a reader service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CountRequest {
    pub parent_keys: Vec<RecordId>,
    pub filter: Option<Filter>,
    pub parameter: Option<Value>,
}
