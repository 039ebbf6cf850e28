//! The benign-skip path: an event whose target row does not exist yet is
//! marked processed (so the channel stops redelivering) and the periodic
//! drift sweep closes the gap once the target appears. The sweep also
//! re-patches records that lost their confirmed fields.

use ddk_reconcile::{drift_sweep, ReconcileEvent, Saga, SagaOutcome};
use ddk_schemas::{ChainEventMessage, FeeCategory};
use ddk_testkit::memory_ports;
use serde_json::json;
use uuid::Uuid;

fn tokenized_event(asset_id: Uuid) -> ReconcileEvent {
    ReconcileEvent::AssetTokenized {
        event_id: "evt-skip-1".to_string(),
        asset_id,
        contract_address: "0xcafe".to_string(),
        token_id: "11".to_string(),
    }
}

#[tokio::test]
async fn missing_target_is_a_benign_skip_and_the_sweep_corrects_it() {
    let ports = memory_ports();
    let asset_id = Uuid::new_v4();
    // NOTE: asset intentionally not seeded yet.

    let saga = Saga::new(ports.saga_ports());
    let msg = ChainEventMessage {
        id: "evt-skip-1".to_string(),
        job_id: "job-4".to_string(),
        event_kind: "ASSET_TOKENIZED".to_string(),
        final_status: "COMPLETED".to_string(),
        tx_hash: None,
        block_number: None,
        original_payload: Some(json!({ "assetId": asset_id.to_string() })),
        event_output: Some(json!({ "contractAddress": "0xcafe", "tokenId": "11" })),
        error: None,
    };

    let outcome = saga.ingest_chain(&msg).await.unwrap();
    assert!(matches!(outcome, SagaOutcome::BenignSkip { .. }), "{outcome:?}");
    // Acked: the channel will not loop on this event.
    assert!(ports.markers.contains("evt-skip-1"));
    // Clearly not a dead letter.
    assert!(ports.dead_letters.rows().is_empty());

    // The asset is provisioned later, and the job store remembers the
    // completed job.
    ports
        .catalog
        .seed_asset(asset_id, Uuid::new_v4(), FeeCategory::Standard);
    ports.jobs.push_completed(tokenized_event(asset_id));

    let report = drift_sweep(&saga).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.corrected, 1);

    let asset = ports.catalog.get(asset_id).unwrap();
    assert_eq!(asset.contract_address.as_deref(), Some("0xcafe"));
    assert_eq!(asset.token_id.as_deref(), Some("11"));
}

#[tokio::test]
async fn sweep_repatches_clobbered_fields_and_is_idempotent() {
    let ports = memory_ports();
    let asset_id = Uuid::new_v4();
    ports
        .catalog
        .seed_asset(asset_id, Uuid::new_v4(), FeeCategory::Standard);
    ports.jobs.push_completed(tokenized_event(asset_id));

    let saga = Saga::new(ports.saga_ports());

    // First sweep writes the fields.
    let report = drift_sweep(&saga).await.unwrap();
    assert_eq!(report.corrected, 1);

    // Second sweep sees everything in sync.
    let report = drift_sweep(&saga).await.unwrap();
    assert_eq!(report.corrected, 0);

    // Something wipes the fields behind the saga's back.
    ports.catalog.clobber_confirmed_fields(asset_id);
    let report = drift_sweep(&saga).await.unwrap();
    assert_eq!(report.corrected, 1);
    assert_eq!(
        ports.catalog.get(asset_id).unwrap().contract_address.as_deref(),
        Some("0xcafe")
    );
}

#[tokio::test]
async fn sweep_counts_targets_that_still_do_not_exist() {
    let ports = memory_ports();
    ports.jobs.push_completed(tokenized_event(Uuid::new_v4()));

    let saga = Saga::new(ports.saga_ports());
    let report = drift_sweep(&saga).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.corrected, 0);
    assert_eq!(report.target_missing, 1);
}
