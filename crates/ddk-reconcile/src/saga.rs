//! The saga engine: dedup, dispatch, outcome classification.

use std::sync::{Arc, Mutex};

use ddk_audit::{OpsLogWriter, CATEGORY_BENIGN_SKIP, CATEGORY_DEAD_LETTER};
use ddk_schemas::{ChainEventMessage, StorageJobNotice};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{SagaError, SagaOutcome, SagaResult};
use crate::event::{parse_chain_message, parse_storage_job, ReconcileEvent};
use crate::ports::{
    ActivityPort, AnalyticsPort, CatalogPort, DeadLetterPort, JobStorePort, MarkerPort,
    PatchOutcome, TransactionPort,
};

// ---------------------------------------------------------------------------
// SagaPorts / Saga
// ---------------------------------------------------------------------------

/// Bundle of every downstream the saga may touch.
#[derive(Clone)]
pub struct SagaPorts {
    pub catalog: Arc<dyn CatalogPort>,
    pub transactions: Arc<dyn TransactionPort>,
    pub activity: Arc<dyn ActivityPort>,
    pub analytics: Arc<dyn AnalyticsPort>,
    pub markers: Arc<dyn MarkerPort>,
    pub dead_letters: Arc<dyn DeadLetterPort>,
    pub jobs: Arc<dyn JobStorePort>,
}

pub struct Saga {
    pub(crate) ports: SagaPorts,
    /// Operator log; optional so unit setups can run without a file.
    ops_log: Option<Arc<Mutex<OpsLogWriter>>>,
}

impl Saga {
    pub fn new(ports: SagaPorts) -> Self {
        Saga {
            ports,
            ops_log: None,
        }
    }

    pub fn with_ops_log(mut self, ops_log: Arc<Mutex<OpsLogWriter>>) -> Self {
        self.ops_log = Some(ops_log);
        self
    }

    // -----------------------------------------------------------------------
    // Channel A: chain finalization messages
    // -----------------------------------------------------------------------

    /// Process one chain finalization delivery.
    ///
    /// # Errors
    /// Only [`SagaError::Transient`] escapes: the transport must redeliver.
    /// Every other failure class resolves to a terminal [`SagaOutcome`].
    pub async fn ingest_chain(&self, msg: &ChainEventMessage) -> SagaResult<SagaOutcome> {
        if self.ports.markers.already_processed(&msg.id).await? {
            info!(event_id = %msg.id, "duplicate chain event skipped");
            return Ok(SagaOutcome::SkippedDuplicate);
        }

        let event = match parse_chain_message(msg) {
            Ok(ev) => ev,
            Err(SagaError::Unrecoverable(reason)) => {
                return self
                    .dead_letter(&msg.id, &msg.event_kind, raw_chain_payload(msg), &reason)
                    .await;
            }
            Err(other) => return Err(other),
        };

        self.apply(&event, raw_chain_payload(msg)).await
    }

    // -----------------------------------------------------------------------
    // Channel B: storage job notices
    // -----------------------------------------------------------------------

    /// Process one storage completion notice: resolve the job id to the full
    /// record, then run the common dispatch path.
    pub async fn ingest_storage(&self, notice: &StorageJobNotice) -> SagaResult<SagaOutcome> {
        if self.ports.markers.already_processed(&notice.job_id).await? {
            info!(job_id = %notice.job_id, "duplicate storage notice skipped");
            return Ok(SagaOutcome::SkippedDuplicate);
        }

        let job = match self.ports.jobs.fetch_storage_job(&notice.job_id).await? {
            Some(job) => job,
            // The job store is the source of truth; a notice it cannot back
            // will never become resolvable by retrying.
            None => {
                let reason = format!("storage job {} not found in job store", notice.job_id);
                return self
                    .dead_letter(&notice.job_id, "STORAGE_JOB", json!({}), &reason)
                    .await;
            }
        };

        let event = match parse_storage_job(&job) {
            Ok(ev) => ev,
            Err(SagaError::Unrecoverable(reason)) => {
                return self
                    .dead_letter(&notice.job_id, &job.kind, job.payload.clone(), &reason)
                    .await;
            }
            Err(other) => return Err(other),
        };

        self.apply(&event, job.payload.clone()).await
    }

    // -----------------------------------------------------------------------
    // Common dispatch
    // -----------------------------------------------------------------------

    /// Run the handler for a typed event, then classify.
    ///
    /// The processed marker is written only after every side effect has
    /// succeeded. If marking itself fails transiently the transport will
    /// redeliver and the handlers re-run — harmless, since every mutation is
    /// an update-by-id or upsert.
    async fn apply(&self, event: &ReconcileEvent, raw_payload: Value) -> SagaResult<SagaOutcome> {
        match self.dispatch(event).await {
            Ok(()) => {
                self.ports
                    .markers
                    .mark_processed(event.dedup_id(), event.kind())
                    .await?;
                info!(event_id = %event.dedup_id(), kind = %event.kind(), "event applied");
                Ok(SagaOutcome::Applied)
            }
            Err(SagaError::Precondition(reason)) => {
                // Recognized not-yet-met condition. Ack so the channel does
                // not loop; the drift sweep closes the gap once the target
                // exists. Distinct log shape from real failures.
                warn!(
                    event_id = %event.dedup_id(),
                    kind = %event.kind(),
                    %reason,
                    "SAGA_BENIGN_SKIP: precondition not met, marked processed"
                );
                self.ops_append(CATEGORY_BENIGN_SKIP, event.dedup_id(), json!({ "reason": reason }));
                self.ports
                    .markers
                    .mark_processed(event.dedup_id(), event.kind())
                    .await?;
                Ok(SagaOutcome::BenignSkip { reason })
            }
            Err(SagaError::Transient(reason)) => {
                info!(
                    event_id = %event.dedup_id(),
                    %reason,
                    "transient failure, deferring to transport redelivery"
                );
                Err(SagaError::Transient(reason))
            }
            Err(SagaError::Unrecoverable(reason)) => {
                self.dead_letter(event.dedup_id(), event.kind(), raw_payload, &reason)
                    .await
            }
        }
    }

    /// One arm per variant; adding a variant will not compile until it is
    /// handled here.
    async fn dispatch(&self, event: &ReconcileEvent) -> SagaResult<()> {
        let dedup_id = event.dedup_id();
        match event {
            ReconcileEvent::AssetTokenized {
                asset_id,
                contract_address,
                token_id,
                ..
            } => {
                // The patch gates the rest: a missing catalog row is the
                // recognized precondition case and nothing else should be
                // written for it.
                match self
                    .ports
                    .catalog
                    .set_token_contract(*asset_id, contract_address, token_id)
                    .await?
                {
                    PatchOutcome::Patched => {}
                    PatchOutcome::TargetMissing => {
                        return Err(SagaError::precondition(format!(
                            "asset {asset_id} is not in the catalog yet"
                        )))
                    }
                }
                let subject = asset_id.to_string();
                let detail = json!({
                    "contractAddress": contract_address,
                    "tokenId": token_id,
                });
                tokio::try_join!(
                    self.ports
                        .activity
                        .append(dedup_id, &subject, "ASSET_TOKENIZED", detail.clone()),
                    self.ports.analytics.upsert("asset_tokenized", &subject, detail),
                )?;
                Ok(())
            }

            ReconcileEvent::TransactionSettled {
                transaction_id,
                tx_hash,
                block_number,
                ..
            } => {
                match self
                    .ports
                    .transactions
                    .set_on_chain_tx_hash(*transaction_id, tx_hash)
                    .await?
                {
                    PatchOutcome::Patched => {}
                    PatchOutcome::TargetMissing => {
                        return Err(SagaError::precondition(format!(
                            "transaction {transaction_id} does not exist yet"
                        )))
                    }
                }
                let subject = transaction_id.to_string();
                let detail = json!({ "txHash": tx_hash, "blockNumber": block_number });
                tokio::try_join!(
                    self.ports
                        .activity
                        .append(dedup_id, &subject, "TRANSACTION_SETTLED", detail.clone()),
                    self.ports.analytics.upsert("transaction_settled", &subject, detail),
                )?;
                Ok(())
            }

            ReconcileEvent::SettlementFailed {
                transaction_id,
                reason,
                ..
            } => {
                let subject = transaction_id.to_string();
                let detail = json!({ "reason": reason });
                tokio::try_join!(
                    self.ports
                        .activity
                        .append(dedup_id, &subject, "SETTLEMENT_FAILED", detail.clone()),
                    self.ports.analytics.upsert("settlement_failed", &subject, detail),
                )?;
                Ok(())
            }

            ReconcileEvent::MetadataPinned { asset_id, cid, .. } => {
                match self.ports.catalog.set_metadata_cid(*asset_id, cid).await? {
                    PatchOutcome::Patched => {}
                    PatchOutcome::TargetMissing => {
                        return Err(SagaError::precondition(format!(
                            "asset {asset_id} is not in the catalog yet"
                        )))
                    }
                }
                self.ports
                    .activity
                    .append(
                        dedup_id,
                        &asset_id.to_string(),
                        "METADATA_PINNED",
                        json!({ "cid": cid }),
                    )
                    .await
            }

            ReconcileEvent::PinFailed { asset_id, reason, .. } => {
                let subject = asset_id.to_string();
                let detail = json!({ "reason": reason });
                tokio::try_join!(
                    self.ports
                        .activity
                        .append(dedup_id, &subject, "PIN_FAILED", detail.clone()),
                    self.ports.analytics.upsert("pin_failed", &subject, detail),
                )?;
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Dead-lettering
    // -----------------------------------------------------------------------

    /// Persist the dead letter, shout for an operator, mark the event
    /// processed so redeliveries short-circuit, then ack.
    async fn dead_letter(
        &self,
        event_id: &str,
        event_kind: &str,
        payload: Value,
        reason: &str,
    ) -> SagaResult<SagaOutcome> {
        error!(
            %event_id,
            %event_kind,
            %reason,
            "SAGA_DEAD_LETTER: event requires manual intervention"
        );
        self.ports
            .dead_letters
            .record(event_id, event_kind, payload.clone(), reason)
            .await?;
        self.ops_append(
            CATEGORY_DEAD_LETTER,
            event_id,
            json!({ "kind": event_kind, "reason": reason, "payload": payload }),
        );
        self.ports.markers.mark_processed(event_id, event_kind).await?;
        Ok(SagaOutcome::Dead {
            reason: reason.to_string(),
        })
    }

    /// Best-effort ops log append; a broken log file must never take the
    /// saga down.
    pub(crate) fn ops_append(&self, category: &str, subject: &str, detail: Value) {
        if let Some(log) = &self.ops_log {
            match log.lock() {
                Ok(mut writer) => {
                    if let Err(e) = writer.append(category, subject, detail) {
                        error!(error = %e, "ops log append failed");
                    }
                }
                Err(_) => error!("ops log mutex poisoned"),
            }
        }
    }
}

fn raw_chain_payload(msg: &ChainEventMessage) -> Value {
    serde_json::to_value(msg).unwrap_or_else(|_| json!({ "id": msg.id }))
}
