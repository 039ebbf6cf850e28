//! The typed event union and the boundary parse that produces it.
//!
//! Everything inbound is loosely typed JSON; this module is the single place
//! where optional chaining happens. Each variant carries exactly the fields
//! its handler needs, already validated. A missing required field is an
//! unrecoverable parse failure — the event can never succeed, no matter how
//! often it is redelivered.

use ddk_schemas::{ChainEventMessage, StorageJobRecord};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SagaError;

/// Chain event kinds (channel A).
pub const KIND_ASSET_TOKENIZED: &str = "ASSET_TOKENIZED";
pub const KIND_TRANSACTION_SETTLED: &str = "TRANSACTION_SETTLED";
/// Storage job kinds (channel B).
pub const KIND_METADATA_PIN: &str = "METADATA_PIN";

pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_FAILED: &str = "FAILED";

// ---------------------------------------------------------------------------
// ReconcileEvent
// ---------------------------------------------------------------------------

/// One variant per (event kind, terminal status) pair the saga understands.
/// Dispatch over this enum is exhaustive; adding a variant forces every
/// handler site to be revisited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// Asset contract deployed and token minted on chain.
    AssetTokenized {
        event_id: String,
        asset_id: Uuid,
        contract_address: String,
        token_id: String,
    },
    /// A transaction's settlement reached finality on chain.
    TransactionSettled {
        event_id: String,
        transaction_id: Uuid,
        tx_hash: String,
        block_number: i64,
    },
    /// The settlement job failed terminally on chain.
    SettlementFailed {
        event_id: String,
        transaction_id: Uuid,
        reason: String,
    },
    /// Asset metadata pinned in content-addressed storage.
    MetadataPinned {
        job_id: String,
        asset_id: Uuid,
        cid: String,
    },
    /// The pinning job failed terminally.
    PinFailed {
        job_id: String,
        asset_id: Uuid,
        reason: String,
    },
}

impl ReconcileEvent {
    /// Dedup key: the delivery id for chain events, the job id for storage
    /// events (channel B has no separate delivery id).
    pub fn dedup_id(&self) -> &str {
        match self {
            ReconcileEvent::AssetTokenized { event_id, .. }
            | ReconcileEvent::TransactionSettled { event_id, .. }
            | ReconcileEvent::SettlementFailed { event_id, .. } => event_id,
            ReconcileEvent::MetadataPinned { job_id, .. }
            | ReconcileEvent::PinFailed { job_id, .. } => job_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileEvent::AssetTokenized { .. } => "ASSET_TOKENIZED",
            ReconcileEvent::TransactionSettled { .. } => "TRANSACTION_SETTLED",
            ReconcileEvent::SettlementFailed { .. } => "SETTLEMENT_FAILED",
            ReconcileEvent::MetadataPinned { .. } => "METADATA_PINNED",
            ReconcileEvent::PinFailed { .. } => "PIN_FAILED",
        }
    }
}

// ---------------------------------------------------------------------------
// Boundary parse — channel A
// ---------------------------------------------------------------------------

/// Parse a chain finalization message into a typed event.
///
/// # Errors
/// [`SagaError::Unrecoverable`] when the kind is unknown or a required field
/// is absent; callers dead-letter these.
pub fn parse_chain_message(msg: &ChainEventMessage) -> Result<ReconcileEvent, SagaError> {
    match (msg.event_kind.as_str(), msg.final_status.as_str()) {
        (KIND_ASSET_TOKENIZED, STATUS_COMPLETED) => {
            let output = msg
                .event_output
                .as_ref()
                .ok_or_else(|| missing(msg, "eventOutput"))?;
            Ok(ReconcileEvent::AssetTokenized {
                event_id: msg.id.clone(),
                asset_id: require_uuid(msg, msg.original_payload.as_ref(), "assetId")?,
                contract_address: require_str(msg, output, "contractAddress")?,
                token_id: require_str(msg, output, "tokenId")?,
            })
        }
        (KIND_TRANSACTION_SETTLED, STATUS_COMPLETED) => Ok(ReconcileEvent::TransactionSettled {
            event_id: msg.id.clone(),
            transaction_id: require_uuid(msg, msg.original_payload.as_ref(), "transactionId")?,
            tx_hash: msg
                .tx_hash
                .clone()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| missing(msg, "txHash"))?,
            block_number: msg.block_number.ok_or_else(|| missing(msg, "blockNumber"))?,
        }),
        (KIND_TRANSACTION_SETTLED, STATUS_FAILED) => Ok(ReconcileEvent::SettlementFailed {
            event_id: msg.id.clone(),
            transaction_id: require_uuid(msg, msg.original_payload.as_ref(), "transactionId")?,
            reason: msg
                .error
                .clone()
                .unwrap_or_else(|| "settlement job failed without an error message".to_string()),
        }),
        // A failed tokenization carries nothing we can reconcile; the asset
        // simply never gets its address and operators see the dead letter.
        (kind, status) => Err(SagaError::unrecoverable(format!(
            "chain event {}: unhandled kind/status {kind}/{status}",
            msg.id
        ))),
    }
}

// ---------------------------------------------------------------------------
// Boundary parse — channel B
// ---------------------------------------------------------------------------

/// Parse a fetched storage job record into a typed event.
pub fn parse_storage_job(job: &StorageJobRecord) -> Result<ReconcileEvent, SagaError> {
    if job.kind != KIND_METADATA_PIN {
        return Err(SagaError::unrecoverable(format!(
            "storage job {}: unknown kind {}",
            job.job_id, job.kind
        )));
    }

    let asset_id = field_str(Some(&job.payload), "assetId")
        .and_then(|s| Uuid::parse_str(&s).ok())
        .ok_or_else(|| {
            SagaError::unrecoverable(format!(
                "storage job {}: payload.assetId missing or not a uuid",
                job.job_id
            ))
        })?;

    match job.status.as_str() {
        STATUS_COMPLETED => {
            let cid = field_str(job.output.as_ref(), "cid").ok_or_else(|| {
                SagaError::unrecoverable(format!(
                    "storage job {}: output.cid missing",
                    job.job_id
                ))
            })?;
            Ok(ReconcileEvent::MetadataPinned {
                job_id: job.job_id.clone(),
                asset_id,
                cid,
            })
        }
        STATUS_FAILED => Ok(ReconcileEvent::PinFailed {
            job_id: job.job_id.clone(),
            asset_id,
            reason: job
                .error
                .clone()
                .unwrap_or_else(|| "pin job failed without an error message".to_string()),
        }),
        other => Err(SagaError::unrecoverable(format!(
            "storage job {}: non-terminal status {other}",
            job.job_id
        ))),
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn field_str(v: Option<&Value>, key: &str) -> Option<String> {
    v?.get(key)?.as_str().map(str::to_string).filter(|s| !s.is_empty())
}

fn require_str(msg: &ChainEventMessage, v: &Value, key: &str) -> Result<String, SagaError> {
    v.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing(msg, &format!("eventOutput.{key}")))
}

fn require_uuid(
    msg: &ChainEventMessage,
    v: Option<&Value>,
    key: &str,
) -> Result<Uuid, SagaError> {
    let raw =
        field_str(v, key).ok_or_else(|| missing(msg, &format!("originalPayload.{key}")))?;
    Uuid::parse_str(&raw).map_err(|_| {
        SagaError::unrecoverable(format!(
            "chain event {}: {key} is not a valid uuid: {raw}",
            msg.id
        ))
    })
}

fn missing(msg: &ChainEventMessage, field: &str) -> SagaError {
    SagaError::unrecoverable(format!(
        "chain event {} ({}): required field {field} is missing",
        msg.id, msg.event_kind
    ))
}
