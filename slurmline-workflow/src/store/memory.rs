//! In-memory store, used by local mode and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use slurmline_core::domain::provenance::ProvenanceEntry;
use slurmline_core::domain::record::{Query, Record};
use tokio::sync::Mutex;

use super::{Records, Store};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: Record) {
        self.records.lock().await.insert(record);
    }

    pub async fn get(&self, id: &str) -> Option<Record> {
        self.records.lock().await.get(id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        Ok(self.records.lock().await.find(query))
    }

    async fn update_metadata(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.records.lock().await.update_metadata(id, fields)
    }

    async fn append_log_entry(&self, id: &str, entry: ProvenanceEntry) -> Result<(), StoreError> {
        self.records.lock().await.append_log_entry(id, entry)
    }

    async fn find_collections_needing_reassembly(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.records.lock().await.needing_reassembly(start, stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::REASSEMBLY_COMPLETE_FIELD;
    use chrono::Duration;
    use slurmline_core::domain::record::RecordKind;

    #[tokio::test]
    async fn test_find_by_kind_and_parent() {
        let store = MemoryStore::new();
        store
            .insert(Record::new("a1", RecordKind::Acquisition).with_parent("o1"))
            .await;
        store
            .insert(Record::new("a2", RecordKind::Acquisition).with_parent("o2"))
            .await;
        store.insert(Record::new("o1", RecordKind::Orbit)).await;

        let found = store
            .find(&Query::kind(RecordKind::Acquisition).with_parent("o1"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a1");

        assert_eq!(store.find(&Query::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_metadata_merges_fields() {
        let store = MemoryStore::new();
        store
            .insert(Record::new("a1", RecordKind::Acquisition).with_metadata("orbit", "o1"))
            .await;

        let mut fields = Map::new();
        fields.insert("scene_number".to_string(), Value::from("001"));
        store.update_metadata("a1", fields).await.unwrap();

        let record = store.get("a1").await.unwrap();
        assert_eq!(record.metadata["orbit"], "o1");
        assert_eq!(record.metadata["scene_number"], "001");
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .append_log_entry("nope", ProvenanceEntry::new("t", "p", "v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_collections_needing_reassembly() {
        let store = MemoryStore::new();
        store.insert(Record::new("dc1", RecordKind::DataCollection)).await;
        store
            .insert(
                Record::new("dc2", RecordKind::DataCollection)
                    .with_metadata(REASSEMBLY_COMPLETE_FIELD, true),
            )
            .await;
        store.insert(Record::new("o1", RecordKind::Orbit)).await;

        let now = Utc::now();
        let found = store
            .find_collections_needing_reassembly(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "dc1");

        let past = store
            .find_collections_needing_reassembly(now - Duration::days(2), now - Duration::days(1))
            .await
            .unwrap();
        assert!(past.is_empty());
    }
}
