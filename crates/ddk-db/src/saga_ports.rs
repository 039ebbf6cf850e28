//! Postgres implementations of the reconciliation saga's ports.
//!
//! Each write is an update-by-id or an upsert, so redelivered events apply
//! naturally idempotently. Driver failures map to `SagaError::Transient` —
//! the transport redelivers; nothing here decides permanence.

use async_trait::async_trait;
use ddk_reconcile::{
    parse_chain_message, parse_storage_job, ActivityPort, AnalyticsPort, CatalogPort,
    DeadLetterPort, JobStorePort, MarkerPort, PatchOutcome, ReconcileEvent, SagaError, SagaPorts,
    SagaResult, TransactionPort,
};
use ddk_schemas::{CatalogAsset, ChainEventMessage, FeeCategory, StorageJobRecord};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

fn transient(what: &str, e: sqlx::Error) -> SagaError {
    SagaError::transient(format!("{what}: {e}"))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub struct PgCatalog {
    pool: PgPool,
}

#[async_trait]
impl CatalogPort for PgCatalog {
    async fn set_token_contract(
        &self,
        asset_id: Uuid,
        contract_address: &str,
        token_id: &str,
    ) -> SagaResult<PatchOutcome> {
        let res = sqlx::query(
            r#"
            update catalog_assets
            set contract_address = $2, token_id = $3, updated_at = now()
            where asset_id = $1
            "#,
        )
        .bind(asset_id)
        .bind(contract_address)
        .bind(token_id)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("catalog.set_token_contract", e))?;

        Ok(patch_outcome(res.rows_affected()))
    }

    async fn set_metadata_cid(&self, asset_id: Uuid, cid: &str) -> SagaResult<PatchOutcome> {
        let res = sqlx::query(
            r#"
            update catalog_assets
            set metadata_cid = $2, updated_at = now()
            where asset_id = $1
            "#,
        )
        .bind(asset_id)
        .bind(cid)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("catalog.set_metadata_cid", e))?;

        Ok(patch_outcome(res.rows_affected()))
    }

    async fn fetch(&self, asset_id: Uuid) -> SagaResult<Option<CatalogAsset>> {
        let row = sqlx::query(
            r#"
            select asset_id, organization_id, fee_category, contract_address,
                   token_id, metadata_cid, updated_at
            from catalog_assets
            where asset_id = $1
            "#,
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| transient("catalog.fetch", e))?;

        row.map(|r| -> SagaResult<CatalogAsset> {
            let category: String = r
                .try_get("fee_category")
                .map_err(|e| SagaError::transient(format!("fee_category decode: {e}")))?;
            Ok(CatalogAsset {
                asset_id: get(&r, "asset_id")?,
                organization_id: get(&r, "organization_id")?,
                fee_category: FeeCategory::parse(&category)
                    .unwrap_or(FeeCategory::Standard),
                contract_address: get(&r, "contract_address")?,
                token_id: get(&r, "token_id")?,
                metadata_cid: get(&r, "metadata_cid")?,
                updated_at: get(&r, "updated_at")?,
            })
        })
        .transpose()
    }
}

fn patch_outcome(rows_affected: u64) -> PatchOutcome {
    if rows_affected > 0 {
        PatchOutcome::Patched
    } else {
        PatchOutcome::TargetMissing
    }
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> SagaResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| SagaError::transient(format!("column {column}: decode failed: {e}")))
}

// ---------------------------------------------------------------------------
// Transactions (the saga-owned field only)
// ---------------------------------------------------------------------------

pub struct PgTransactionPatch {
    pool: PgPool,
}

#[async_trait]
impl TransactionPort for PgTransactionPatch {
    async fn set_on_chain_tx_hash(
        &self,
        transaction_id: Uuid,
        tx_hash: &str,
    ) -> SagaResult<PatchOutcome> {
        let res = sqlx::query(
            r#"
            update transactions
            set on_chain_tx_hash = $2, updated_at = now()
            where id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(tx_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("transactions.set_on_chain_tx_hash", e))?;

        Ok(patch_outcome(res.rows_affected()))
    }

    async fn fetch_on_chain_tx_hash(
        &self,
        transaction_id: Uuid,
    ) -> SagaResult<Option<Option<String>>> {
        let row = sqlx::query("select on_chain_tx_hash from transactions where id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| transient("transactions.fetch_on_chain_tx_hash", e))?;

        row.map(|r| get::<Option<String>>(&r, "on_chain_tx_hash"))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Activity / analytics
// ---------------------------------------------------------------------------

pub struct PgActivity {
    pool: PgPool,
}

#[async_trait]
impl ActivityPort for PgActivity {
    async fn append(
        &self,
        event_id: &str,
        subject: &str,
        entry_type: &str,
        detail: Value,
    ) -> SagaResult<()> {
        // Idempotent on (event_id, entry_type): a redelivery after a partial
        // failure re-runs this as a no-op.
        sqlx::query(
            r#"
            insert into activity_log (event_id, subject_id, entry_type, detail)
            values ($1, $2, $3, $4)
            on conflict (event_id, entry_type) do nothing
            "#,
        )
        .bind(event_id)
        .bind(subject)
        .bind(entry_type)
        .bind(&detail)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("activity.append", e))?;
        Ok(())
    }
}

pub struct PgAnalytics {
    pool: PgPool,
}

#[async_trait]
impl AnalyticsPort for PgAnalytics {
    async fn upsert(&self, metric: &str, subject: &str, value: Value) -> SagaResult<()> {
        sqlx::query(
            r#"
            insert into analytics_rows (metric, subject_id, value, updated_at)
            values ($1, $2, $3, now())
            on conflict (metric, subject_id)
            do update set value = excluded.value, updated_at = now()
            "#,
        )
        .bind(metric)
        .bind(subject)
        .bind(&value)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("analytics.upsert", e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Markers / dead letters
// ---------------------------------------------------------------------------

pub struct PgMarkers {
    pool: PgPool,
}

#[async_trait]
impl MarkerPort for PgMarkers {
    async fn already_processed(&self, event_id: &str) -> SagaResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "select exists (select 1 from processed_events where event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| transient("markers.already_processed", e))?;
        Ok(exists)
    }

    async fn mark_processed(&self, event_id: &str, event_kind: &str) -> SagaResult<()> {
        sqlx::query(
            r#"
            insert into processed_events (event_id, event_kind)
            values ($1, $2)
            on conflict (event_id) do nothing
            "#,
        )
        .bind(event_id)
        .bind(event_kind)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("markers.mark_processed", e))?;
        Ok(())
    }
}

pub struct PgDeadLetters {
    pool: PgPool,
}

#[async_trait]
impl DeadLetterPort for PgDeadLetters {
    async fn record(
        &self,
        event_id: &str,
        event_kind: &str,
        payload: Value,
        reason: &str,
    ) -> SagaResult<()> {
        sqlx::query(
            r#"
            insert into dead_letters (event_id, event_kind, payload, reason)
            values ($1, $2, $3, $4)
            on conflict (event_id) do nothing
            "#,
        )
        .bind(event_id)
        .bind(event_kind)
        .bind(&payload)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("dead_letters.record", e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job store (read-only mirror tables owned by the job runners)
// ---------------------------------------------------------------------------

pub struct PgJobStore {
    pool: PgPool,
}

#[async_trait]
impl JobStorePort for PgJobStore {
    async fn fetch_storage_job(&self, job_id: &str) -> SagaResult<Option<StorageJobRecord>> {
        let row = sqlx::query(
            "select job_id, kind, status, payload, output, error from storage_jobs where job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| transient("jobs.fetch_storage_job", e))?;

        row.map(|r| -> SagaResult<StorageJobRecord> {
            Ok(StorageJobRecord {
                job_id: get(&r, "job_id")?,
                kind: get(&r, "kind")?,
                status: get(&r, "status")?,
                payload: get(&r, "payload")?,
                output: get(&r, "output")?,
                error: get(&r, "error")?,
            })
        })
        .transpose()
    }

    async fn completed_events(&self) -> SagaResult<Vec<ReconcileEvent>> {
        let mut events = Vec::new();

        let chain_rows = sqlx::query(
            r#"
            select event_id, job_id, event_kind, final_status, tx_hash,
                   block_number, original_payload, event_output, error
            from chain_jobs
            where final_status in ('COMPLETED','FAILED')
            order by updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| transient("jobs.completed_events chain", e))?;

        for r in chain_rows {
            let msg = ChainEventMessage {
                id: get(&r, "event_id")?,
                job_id: get(&r, "job_id")?,
                event_kind: get(&r, "event_kind")?,
                final_status: get(&r, "final_status")?,
                tx_hash: get(&r, "tx_hash")?,
                block_number: get(&r, "block_number")?,
                original_payload: get(&r, "original_payload")?,
                event_output: get(&r, "event_output")?,
                error: get(&r, "error")?,
            };
            match parse_chain_message(&msg) {
                Ok(ev) => events.push(ev),
                // Malformed job rows were dead-lettered on delivery; the
                // sweep has nothing to re-derive from them.
                Err(e) => warn!(event_id = %msg.id, error = %e, "drift sweep skipping unparseable chain job"),
            }
        }

        let storage_rows = sqlx::query(
            r#"
            select job_id, kind, status, payload, output, error
            from storage_jobs
            where status in ('COMPLETED','FAILED')
            order by updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| transient("jobs.completed_events storage", e))?;

        for r in storage_rows {
            let job = StorageJobRecord {
                job_id: get(&r, "job_id")?,
                kind: get(&r, "kind")?,
                status: get(&r, "status")?,
                payload: get(&r, "payload")?,
                output: get(&r, "output")?,
                error: get(&r, "error")?,
            };
            match parse_storage_job(&job) {
                Ok(ev) => events.push(ev),
                Err(e) => warn!(job_id = %job.job_id, error = %e, "drift sweep skipping unparseable storage job"),
            }
        }

        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Wiring + seeding
// ---------------------------------------------------------------------------

/// Build the full port bundle over one pool.
pub fn pg_saga_ports(pool: &PgPool) -> SagaPorts {
    SagaPorts {
        catalog: Arc::new(PgCatalog { pool: pool.clone() }),
        transactions: Arc::new(PgTransactionPatch { pool: pool.clone() }),
        activity: Arc::new(PgActivity { pool: pool.clone() }),
        analytics: Arc::new(PgAnalytics { pool: pool.clone() }),
        markers: Arc::new(PgMarkers { pool: pool.clone() }),
        dead_letters: Arc::new(PgDeadLetters { pool: pool.clone() }),
        jobs: Arc::new(PgJobStore { pool: pool.clone() }),
    }
}

/// Upsert a catalog asset row (organization + fee category). Used by ops
/// tooling and tests; the saga itself never creates catalog rows.
pub async fn seed_catalog_asset(
    pool: &PgPool,
    asset_id: Uuid,
    organization_id: Uuid,
    fee_category: FeeCategory,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into catalog_assets (asset_id, organization_id, fee_category)
        values ($1, $2, $3)
        on conflict (asset_id)
        do update set organization_id = excluded.organization_id,
                      fee_category = excluded.fee_category,
                      updated_at = now()
        "#,
    )
    .bind(asset_id)
    .bind(organization_id)
    .bind(fee_category.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert an organization's fee structure.
pub async fn upsert_fee_structure(
    pool: &PgPool,
    organization_id: Uuid,
    platform_fee_bps: i64,
    integrator_fee_bps: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into fee_structures (organization_id, platform_fee_bps, integrator_fee_bps)
        values ($1, $2, $3)
        on conflict (organization_id)
        do update set platform_fee_bps = excluded.platform_fee_bps,
                      integrator_fee_bps = excluded.integrator_fee_bps
        "#,
    )
    .bind(organization_id)
    .bind(platform_fee_bps)
    .bind(integrator_fee_bps)
    .execute(pool)
    .await?;
    Ok(())
}
