//! Periodic drift correction.
//!
//! The job store is the upstream source of truth for what *should* have been
//! applied. The sweep walks every terminally-completed job, re-derives the
//! expected canonical state, and re-patches any record that drifted — which
//! covers events dropped by transport bugs and gaps left by the benign-skip
//! path once the target row finally exists.

use ddk_audit::CATEGORY_DRIFT_CORRECTED;
use serde_json::json;
use tracing::warn;

use crate::error::SagaResult;
use crate::event::ReconcileEvent;
use crate::ports::PatchOutcome;
use crate::saga::Saga;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Completed jobs inspected.
    pub examined: usize,
    /// Records found drifted and re-patched.
    pub corrected: usize,
    /// Jobs whose target record still does not exist.
    pub target_missing: usize,
}

/// One sweep pass. Writes are the same idempotent patches the live handlers
/// use, so overlapping sweeps or sweep-vs-handler races settle on the same
/// state.
pub async fn drift_sweep(saga: &Saga) -> SagaResult<DriftReport> {
    let mut report = DriftReport::default();

    for event in saga.ports.jobs.completed_events().await? {
        report.examined += 1;
        match &event {
            ReconcileEvent::AssetTokenized {
                asset_id,
                contract_address,
                token_id,
                ..
            } => {
                let Some(asset) = saga.ports.catalog.fetch(*asset_id).await? else {
                    report.target_missing += 1;
                    continue;
                };
                let in_sync = asset.contract_address.as_deref() == Some(contract_address.as_str())
                    && asset.token_id.as_deref() == Some(token_id.as_str());
                if !in_sync {
                    saga.ports
                        .catalog
                        .set_token_contract(*asset_id, contract_address, token_id)
                        .await?;
                    correction(saga, &mut report, &event, "token contract fields");
                }
            }

            ReconcileEvent::MetadataPinned { asset_id, cid, .. } => {
                let Some(asset) = saga.ports.catalog.fetch(*asset_id).await? else {
                    report.target_missing += 1;
                    continue;
                };
                if asset.metadata_cid.as_deref() != Some(cid.as_str()) {
                    saga.ports.catalog.set_metadata_cid(*asset_id, cid).await?;
                    correction(saga, &mut report, &event, "metadata_cid");
                }
            }

            ReconcileEvent::TransactionSettled {
                transaction_id,
                tx_hash,
                ..
            } => {
                let Some(stored) = saga
                    .ports
                    .transactions
                    .fetch_on_chain_tx_hash(*transaction_id)
                    .await?
                else {
                    report.target_missing += 1;
                    continue;
                };
                if stored.as_deref() != Some(tx_hash.as_str()) {
                    let outcome = saga
                        .ports
                        .transactions
                        .set_on_chain_tx_hash(*transaction_id, tx_hash)
                        .await?;
                    if outcome == PatchOutcome::Patched {
                        correction(saga, &mut report, &event, "on_chain_tx_hash");
                    }
                }
            }

            // Failure events carry no canonical field to re-derive.
            ReconcileEvent::SettlementFailed { .. } | ReconcileEvent::PinFailed { .. } => {}
        }
    }

    Ok(report)
}

fn correction(saga: &Saga, report: &mut DriftReport, event: &ReconcileEvent, field: &str) {
    report.corrected += 1;
    warn!(
        event_id = %event.dedup_id(),
        kind = %event.kind(),
        %field,
        "DRIFT_CORRECTED: canonical record re-patched from job store"
    );
    saga.ops_append(
        CATEGORY_DRIFT_CORRECTED,
        event.dedup_id(),
        json!({ "kind": event.kind(), "field": field }),
    );
}
