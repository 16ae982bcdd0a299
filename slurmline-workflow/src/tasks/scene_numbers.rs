//! Scene numbering for an orbit
//!
//! Every acquisition of the orbit gets a three-digit scene number in
//! sorted-id order. Numbering is all-or-nothing: an orbit where only some
//! acquisitions are numbered is rejected before anything is written.

use serde_json::{Map, Value};
use slurmline_core::domain::provenance::ProvenanceEntry;
use slurmline_core::domain::record::{Query, RecordKind};
use slurmline_core::domain::work_item::SceneNumberParams;
use tracing::{debug, info};

use super::TaskContext;
use crate::error::WorkError;

/// Acquisition metadata field holding the scene number
pub const SCENE_NUMBER_FIELD: &str = "scene_number";

const TASK_NAME: &str = "assign_scene_numbers";

pub(super) async fn run(params: &SceneNumberParams, ctx: &TaskContext<'_>) -> Result<(), WorkError> {
    let pge = ctx.config.pge(&ctx.config.self_pge).ok_or_else(|| {
        WorkError::Unexpected(format!(
            "processing element '{}' is not configured",
            ctx.config.self_pge
        ))
    })?;
    let store = &ctx.services.store;

    let acquisitions = store
        .find(&Query::kind(RecordKind::Acquisition).with_parent(&params.orbit_id))
        .await?;

    let numbered = acquisitions
        .iter()
        .filter(|a| a.has_field(SCENE_NUMBER_FIELD))
        .count();

    if !params.override_output {
        if numbered > 0 && numbered < acquisitions.len() {
            return Err(WorkError::Failed(format!(
                "orbit {}: {} of {} acquisitions already have scene numbers",
                params.orbit_id,
                numbered,
                acquisitions.len()
            )));
        }

        if numbered > 0 && numbered == acquisitions.len() {
            info!(
                "All {} acquisitions in orbit {} already have scene numbers, skipping",
                numbered, params.orbit_id
            );
            return Ok(());
        }
    }

    let mut ids: Vec<String> = acquisitions.into_iter().map(|a| a.id).collect();
    ids.sort();
    ids.dedup();

    for (idx, id) in ids.iter().enumerate() {
        let scene = format!("{:03}", idx + 1);

        let mut fields = Map::new();
        fields.insert(SCENE_NUMBER_FIELD.to_string(), Value::from(scene.clone()));
        store.update_metadata(id, fields).await?;

        let entry = ProvenanceEntry::new(TASK_NAME, &pge.repo_url, &pge.version_tag)
            .with_input("orbit_id", params.orbit_id.as_str())
            .with_output(SCENE_NUMBER_FIELD, scene.as_str());
        store.append_log_entry(id, entry).await?;

        debug!("Assigned scene {} to {}", scene, id);
    }

    let rollup = ProvenanceEntry::new(TASK_NAME, &pge.repo_url, &pge.version_tag)
        .with_input("orbit_id", params.orbit_id.as_str())
        .with_output("number_of_scenes", ids.len());
    store.append_log_entry(&params.orbit_id, rollup).await?;

    info!(
        "Assigned {} scene numbers in orbit {}",
        ids.len(),
        params.orbit_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use crate::tasks::execute;
    use crate::testing::{Fixture, scene_item};
    use slurmline_core::domain::record::Record;

    async fn seed(store: &MemoryStore, ids: &[&str]) {
        store.insert(Record::new("o1", RecordKind::Orbit)).await;
        for id in ids {
            store
                .insert(Record::new(*id, RecordKind::Acquisition).with_parent("o1"))
                .await;
        }
    }

    #[tokio::test]
    async fn test_assigns_contiguous_numbers_in_sorted_order() {
        let fixture = Fixture::new();
        seed(&fixture.store, &["a3", "a1", "a2"]).await;

        execute(&scene_item("o1", false), &fixture.context())
            .await
            .unwrap();

        for (id, scene) in [("a1", "001"), ("a2", "002"), ("a3", "003")] {
            let record = fixture.store.get(id).await.unwrap();
            assert_eq!(record.metadata[SCENE_NUMBER_FIELD], scene);
            assert_eq!(record.processing_log.len(), 1);
            assert_eq!(record.processing_log[0].output[SCENE_NUMBER_FIELD], scene);
        }

        let orbit = fixture.store.get("o1").await.unwrap();
        assert_eq!(orbit.processing_log.len(), 1);
        assert_eq!(orbit.processing_log[0].output["number_of_scenes"], 3);
        assert_eq!(orbit.processing_log[0].pge_input_files["orbit_id"], "o1");
    }

    #[tokio::test]
    async fn test_partial_numbering_fails_before_mutating() {
        let fixture = Fixture::new();
        seed(&fixture.store, &["a1", "a2"]).await;
        let mut fields = Map::new();
        fields.insert(SCENE_NUMBER_FIELD.to_string(), Value::from("007"));
        fixture.store.update_metadata("a2", fields).await.unwrap();

        let err = execute(&scene_item("o1", false), &fixture.context())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());

        let a1 = fixture.store.get("a1").await.unwrap();
        assert!(!a1.has_field(SCENE_NUMBER_FIELD));
        assert!(a1.processing_log.is_empty());
        assert_eq!(
            fixture.store.get("a2").await.unwrap().metadata[SCENE_NUMBER_FIELD],
            "007"
        );
        assert!(fixture.store.get("o1").await.unwrap().processing_log.is_empty());
    }

    #[tokio::test]
    async fn test_fully_numbered_orbit_is_skipped() {
        let fixture = Fixture::new();
        seed(&fixture.store, &["a1"]).await;
        let mut fields = Map::new();
        fields.insert(SCENE_NUMBER_FIELD.to_string(), Value::from("001"));
        fixture.store.update_metadata("a1", fields).await.unwrap();

        execute(&scene_item("o1", false), &fixture.context())
            .await
            .unwrap();
        assert!(fixture.store.get("o1").await.unwrap().processing_log.is_empty());
    }

    #[tokio::test]
    async fn test_override_renumbers() {
        let fixture = Fixture::new();
        seed(&fixture.store, &["a1", "a2"]).await;
        let mut fields = Map::new();
        fields.insert(SCENE_NUMBER_FIELD.to_string(), Value::from("009"));
        fixture.store.update_metadata("a2", fields).await.unwrap();

        execute(&scene_item("o1", true), &fixture.context())
            .await
            .unwrap();
        assert_eq!(
            fixture.store.get("a2").await.unwrap().metadata[SCENE_NUMBER_FIELD],
            "002"
        );
    }
}
