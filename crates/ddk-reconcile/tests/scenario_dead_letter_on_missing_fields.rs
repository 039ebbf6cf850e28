//! A required output field that is missing can never be fixed by retrying:
//! the event must be dead-lettered (persisted, loudly logged) and then
//! acked, so redeliveries short-circuit instead of looping forever.

use ddk_reconcile::{Saga, SagaOutcome};
use ddk_schemas::{ChainEventMessage, FeeCategory};
use ddk_testkit::memory_ports;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn missing_contract_address_dead_letters_and_acks() {
    let ports = memory_ports();
    let asset_id = Uuid::new_v4();
    ports
        .catalog
        .seed_asset(asset_id, Uuid::new_v4(), FeeCategory::Standard);

    let saga = Saga::new(ports.saga_ports());
    let msg = ChainEventMessage {
        id: "evt-broken-1".to_string(),
        job_id: "job-9".to_string(),
        event_kind: "ASSET_TOKENIZED".to_string(),
        final_status: "COMPLETED".to_string(),
        tx_hash: None,
        block_number: None,
        original_payload: Some(json!({ "assetId": asset_id.to_string() })),
        // tokenId present, contractAddress missing -> unrecoverable.
        event_output: Some(json!({ "tokenId": "7" })),
        error: None,
    };

    let outcome = saga.ingest_chain(&msg).await.unwrap();
    match outcome {
        SagaOutcome::Dead { reason } => assert!(reason.contains("contractAddress")),
        other => panic!("expected Dead, got {other:?}"),
    }

    // Persisted for the operator.
    let letters = ports.dead_letters.rows();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].event_id, "evt-broken-1");

    // No catalog mutation happened.
    let asset = ports.catalog.get(asset_id).unwrap();
    assert!(asset.contract_address.is_none());

    // Acked: the redelivery is a duplicate, not a second dead letter.
    assert_eq!(
        saga.ingest_chain(&msg).await.unwrap(),
        SagaOutcome::SkippedDuplicate
    );
    assert_eq!(ports.dead_letters.rows().len(), 1);
}

#[tokio::test]
async fn unknown_event_kind_dead_letters() {
    let ports = memory_ports();
    let saga = Saga::new(ports.saga_ports());

    let msg = ChainEventMessage {
        id: "evt-unknown-1".to_string(),
        job_id: "job-10".to_string(),
        event_kind: "GOVERNANCE_VOTE".to_string(),
        final_status: "COMPLETED".to_string(),
        tx_hash: None,
        block_number: None,
        original_payload: None,
        event_output: None,
        error: None,
    };

    assert!(matches!(
        saga.ingest_chain(&msg).await.unwrap(),
        SagaOutcome::Dead { .. }
    ));
    assert_eq!(ports.dead_letters.rows().len(), 1);
}
