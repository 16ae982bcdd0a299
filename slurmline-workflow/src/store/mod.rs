//! Persistence collaborator
//!
//! An opaque keyed store of records. The execution core only ever appends
//! log entries or updates named metadata fields of one record at a time.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slurmline_core::domain::provenance::ProvenanceEntry;
use slurmline_core::domain::record::{Query, Record, RecordKind};
use std::collections::BTreeMap;

use crate::error::StoreError;

/// Metadata field set on a data collection once it has been reassembled
pub const REASSEMBLY_COMPLETE_FIELD: &str = "reassembly_complete";

#[async_trait]
pub trait Store: Send + Sync {
    async fn find(&self, query: &Query) -> Result<Vec<Record>, StoreError>;

    /// Sets the given metadata fields; other fields are left untouched
    async fn update_metadata(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    async fn append_log_entry(&self, id: &str, entry: ProvenanceEntry) -> Result<(), StoreError>;

    /// Data collections touched within `[start, stop]` that are not yet reassembled
    async fn find_collections_needing_reassembly(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Record table shared by the store implementations
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct Records(BTreeMap<String, Record>);

impl Records {
    pub fn insert(&mut self, record: Record) {
        self.0.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.0.get(id)
    }

    pub fn find(&self, query: &Query) -> Vec<Record> {
        self.0
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect()
    }

    pub fn update_metadata(
        &mut self,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let record = self.record_mut(id)?;
        record.metadata.extend(fields);
        record.updated_at = Utc::now();
        Ok(())
    }

    pub fn append_log_entry(&mut self, id: &str, entry: ProvenanceEntry) -> Result<(), StoreError> {
        let record = self.record_mut(id)?;
        record.processing_log.push(entry);
        record.updated_at = Utc::now();
        Ok(())
    }

    pub fn needing_reassembly(&self, start: DateTime<Utc>, stop: DateTime<Utc>) -> Vec<Record> {
        self.0
            .values()
            .filter(|r| r.kind == RecordKind::DataCollection)
            .filter(|r| r.updated_at >= start && r.updated_at <= stop)
            .filter(|r| !r.has_field(REASSEMBLY_COMPLETE_FIELD))
            .cloned()
            .collect()
    }

    fn record_mut(&mut self, id: &str) -> Result<&mut Record, StoreError> {
        self.0
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
