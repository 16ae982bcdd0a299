//! Keyed store records
//!
//! The persistence collaborator is an opaque keyed store. These types are
//! the minimal view the execution core needs of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::provenance::ProvenanceEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Acquisition,
    Orbit,
    DataCollection,
}

/// A stored record with free-form metadata and its processing log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub kind: RecordKind,
    /// Owning collection (e.g. the orbit of an acquisition)
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub processing_log: Vec<ProvenanceEntry>,
}

impl Record {
    pub fn new(id: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id: None,
            metadata: Map::new(),
            updated_at: Utc::now(),
            processing_log: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }
}

/// Record lookup filter; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub kind: Option<RecordKind>,
    pub parent_id: Option<String>,
}

impl Query {
    pub fn kind(kind: RecordKind) -> Self {
        Self {
            kind: Some(kind),
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.kind.is_none_or(|k| k == record.kind)
            && self
                .parent_id
                .as_ref()
                .is_none_or(|p| record.parent_id.as_ref() == Some(p))
    }
}
