//! Immutable records fetched from a reader service.

use super::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Property name to value map used for record payloads and create requests.
pub type RecordData = BTreeMap<String, Value>;

/// Stable server-side identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Generate a fresh random id, the way services assign ids to created records.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Id plus the version the client last saw; used for update/delete/refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: RecordId,
    pub version: u64,
}

/// Changed properties of one persisted record, sent to an updater service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordModification {
    pub key: RecordKey,
    pub changes: RecordData,
}

/// One row as delivered by a service.
///
/// `id` is `None` only for records built locally from default values that
/// have not been created on the server yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<RecordId>,
    #[serde(default)]
    pub version: u64,
    pub values: RecordData,
}

impl Record {
    /// Build a persisted record with the given id and version.
    pub fn persisted(id: impl Into<RecordId>, version: u64, values: RecordData) -> Self {
        Self {
            id: Some(id.into()),
            version,
            values,
        }
    }

    /// Build a record that has no server identity yet.
    pub fn transient(values: RecordData) -> Self {
        Self {
            id: None,
            version: 0,
            values,
        }
    }

    /// Builder-style helper to set one value.
    pub fn with(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.values.insert(property.to_string(), value.into());
        self
    }

    /// Value of `property`, `None` when the record does not carry it.
    pub fn value(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    pub fn key(&self) -> Option<RecordKey> {
        self.id.as_ref().map(|id| RecordKey {
            id: id.clone(),
            version: self.version,
        })
    }

    /// `true` when both records carry the same id, version and values.
    ///
    /// Used to decide whether a re-fetched row actually changed.
    pub fn same_content(&self, other: &Record) -> bool {
        self.id == other.id && self.version == other.version && self.values == other.values
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
