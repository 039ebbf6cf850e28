//! Wire DTOs for the two inbound job-outcome channels.
//!
//! Both channels deliver at-least-once; dedup and typed dispatch happen in
//! ddk-reconcile. These structs mirror the external systems' JSON (camelCase)
//! and deliberately keep loosely-typed `Value` payloads — the boundary parse
//! into strongly-typed events is the saga's job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel A: blockchain job finalization message, pushed by the chain job
/// runner when a job reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEventMessage {
    /// Delivery id; the dedup key for this channel.
    pub id: String,
    pub job_id: String,
    /// e.g. "ASSET_TOKENIZED", "TRANSACTION_SETTLED".
    pub event_kind: String,
    /// "COMPLETED" | "FAILED".
    pub final_status: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<i64>,
    /// The payload originally submitted with the job, echoed back for
    /// reconciliation context.
    #[serde(default)]
    pub original_payload: Option<Value>,
    /// Job runner output (confirmed addresses, token ids, ...).
    #[serde(default)]
    pub event_output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Channel B: storage pinning completion/failure notice. Carries only the
/// job id; the full record must be fetched from the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageJobNotice {
    pub job_id: String,
}

/// Full storage job record as returned by the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageJobRecord {
    pub job_id: String,
    /// e.g. "METADATA_PIN".
    pub kind: String,
    /// "COMPLETED" | "FAILED".
    pub status: String,
    /// The payload originally submitted with the job.
    pub payload: Value,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}
