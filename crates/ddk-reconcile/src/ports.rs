//! Ports: the only write paths the saga has into the systems of record.
//!
//! Production wires these to Postgres (ddk-db); tests use the in-memory
//! implementations from ddk-testkit. Every mutation is update-by-id or
//! upsert so repeated application is naturally idempotent, and every
//! implementation must map its transport failures onto [`SagaError`]
//! (connection loss / timeout -> Transient).

use async_trait::async_trait;
use ddk_schemas::{CatalogAsset, StorageJobRecord};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SagaResult;

/// Result of a PATCH-by-id: either the row was found and (re)written, or the
/// target does not exist — which the saga treats as a recognized
/// precondition-not-met, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched,
    TargetMissing,
}

/// Canonical asset catalog: the confirmed-identifier fields only.
#[async_trait]
pub trait CatalogPort: Send + Sync {
    async fn set_token_contract(
        &self,
        asset_id: Uuid,
        contract_address: &str,
        token_id: &str,
    ) -> SagaResult<PatchOutcome>;

    async fn set_metadata_cid(&self, asset_id: Uuid, cid: &str) -> SagaResult<PatchOutcome>;

    /// Read-back for the drift sweep.
    async fn fetch(&self, asset_id: Uuid) -> SagaResult<Option<CatalogAsset>>;
}

/// The one transaction field the saga owns: the confirmed settlement hash.
#[async_trait]
pub trait TransactionPort: Send + Sync {
    async fn set_on_chain_tx_hash(
        &self,
        transaction_id: Uuid,
        tx_hash: &str,
    ) -> SagaResult<PatchOutcome>;

    /// Read-back for the drift sweep.
    async fn fetch_on_chain_tx_hash(&self, transaction_id: Uuid)
        -> SagaResult<Option<Option<String>>>;
}

/// Immutable activity log append. Append-only; no updates, no deletes.
/// `subject` is the id of whatever the entry is about (asset, transaction).
/// Implementations must make the insert idempotent on (event_id, entry_type)
/// so a redelivery after a partial failure cannot duplicate an entry.
#[async_trait]
pub trait ActivityPort: Send + Sync {
    async fn append(
        &self,
        event_id: &str,
        subject: &str,
        entry_type: &str,
        detail: Value,
    ) -> SagaResult<()>;
}

/// Analytics rows keyed (metric, subject); upsert semantics.
#[async_trait]
pub trait AnalyticsPort: Send + Sync {
    async fn upsert(&self, metric: &str, subject: &str, value: Value) -> SagaResult<()>;
}

/// Durable processed-event markers. `mark_processed` must be idempotent
/// (insert-if-absent) so concurrent consumers racing on the same event id
/// both succeed and neither double-applies afterwards.
#[async_trait]
pub trait MarkerPort: Send + Sync {
    async fn already_processed(&self, event_id: &str) -> SagaResult<bool>;
    async fn mark_processed(&self, event_id: &str, event_kind: &str) -> SagaResult<()>;
}

/// Dead-letter persistence. Insert-if-absent keyed by event id.
#[async_trait]
pub trait DeadLetterPort: Send + Sync {
    async fn record(
        &self,
        event_id: &str,
        event_kind: &str,
        payload: Value,
        reason: &str,
    ) -> SagaResult<()>;
}

/// The upstream job store — the source of truth the drift sweep re-derives
/// expected state from, and where channel B notices are resolved to full
/// records.
#[async_trait]
pub trait JobStorePort: Send + Sync {
    async fn fetch_storage_job(&self, job_id: &str) -> SagaResult<Option<StorageJobRecord>>;

    /// All terminally-completed jobs, expressed as the typed events they
    /// should have produced. Both channels.
    async fn completed_events(&self) -> SagaResult<Vec<crate::event::ReconcileEvent>>;
}
