//! Channel B delivers only a job id; the saga must fetch the full record
//! from the job store, then run the common dedup/dispatch path.

use ddk_reconcile::{Saga, SagaOutcome};
use ddk_schemas::{FeeCategory, StorageJobNotice, StorageJobRecord};
use ddk_testkit::memory_ports;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn completed_pin_job_patches_the_cid() {
    let ports = memory_ports();
    let asset_id = Uuid::new_v4();
    ports
        .catalog
        .seed_asset(asset_id, Uuid::new_v4(), FeeCategory::Community);
    ports.jobs.put_storage_job(StorageJobRecord {
        job_id: "pin-1".to_string(),
        kind: "METADATA_PIN".to_string(),
        status: "COMPLETED".to_string(),
        payload: json!({ "assetId": asset_id.to_string() }),
        output: Some(json!({ "cid": "bafybeihash" })),
        error: None,
    });

    let saga = Saga::new(ports.saga_ports());
    let notice = StorageJobNotice {
        job_id: "pin-1".to_string(),
    };

    assert_eq!(saga.ingest_storage(&notice).await.unwrap(), SagaOutcome::Applied);
    assert_eq!(
        ports.catalog.get(asset_id).unwrap().metadata_cid.as_deref(),
        Some("bafybeihash")
    );

    // Redelivered notice is a duplicate.
    assert_eq!(
        saga.ingest_storage(&notice).await.unwrap(),
        SagaOutcome::SkippedDuplicate
    );
    assert_eq!(ports.activity.entries_for(&asset_id.to_string()).len(), 1);
}

#[tokio::test]
async fn failed_pin_job_records_activity_but_patches_nothing() {
    let ports = memory_ports();
    let asset_id = Uuid::new_v4();
    ports
        .catalog
        .seed_asset(asset_id, Uuid::new_v4(), FeeCategory::Standard);
    ports.jobs.put_storage_job(StorageJobRecord {
        job_id: "pin-2".to_string(),
        kind: "METADATA_PIN".to_string(),
        status: "FAILED".to_string(),
        payload: json!({ "assetId": asset_id.to_string() }),
        output: None,
        error: Some("provider unreachable".to_string()),
    });

    let saga = Saga::new(ports.saga_ports());
    let notice = StorageJobNotice {
        job_id: "pin-2".to_string(),
    };

    assert_eq!(saga.ingest_storage(&notice).await.unwrap(), SagaOutcome::Applied);
    assert!(ports.catalog.get(asset_id).unwrap().metadata_cid.is_none());

    let entries = ports.activity.entries_for(&asset_id.to_string());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, "PIN_FAILED");
    assert_eq!(entries[0].detail["reason"], "provider unreachable");
}

#[tokio::test]
async fn notice_for_unknown_job_is_dead_lettered() {
    let ports = memory_ports();
    let saga = Saga::new(ports.saga_ports());

    let notice = StorageJobNotice {
        job_id: "pin-ghost".to_string(),
    };
    let outcome = saga.ingest_storage(&notice).await.unwrap();
    assert!(matches!(outcome, SagaOutcome::Dead { .. }), "{outcome:?}");
    assert_eq!(ports.dead_letters.rows().len(), 1);
    assert_eq!(ports.dead_letters.rows()[0].event_id, "pin-ghost");
}
