//! Idempotency record persistence: the pre-claim protocol over the primary
//! key on `idempotency_records.key`. The decision logic itself lives in
//! ddk-idempotency; this module only runs its verdicts against Postgres.

use chrono::Utc;
use ddk_idempotency::{decide, record_expiry, Decision, RequestScope, StoredRecord};
use ddk_schemas::{DomainError, DomainResult};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::db_err;

/// Outcome of the pre-claim step for one incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyBegin {
    /// Key is ours: execute the operation, then call `idempotency_complete`
    /// (or `idempotency_release` if the outcome is retryable).
    Claimed,
    /// Stored response returned verbatim; do NOT re-execute.
    Replay {
        response_status: i16,
        response_body: Value,
    },
    /// A first sighting with this key is still executing.
    InFlight,
    /// Key is bound to a different method/path/actor/body.
    ScopeConflict,
}

/// Claim the key or resolve the replay, in at most two rounds (the second
/// round only happens when an expired record had to be deleted first).
pub async fn idempotency_begin(
    pool: &PgPool,
    key: &str,
    scope: &RequestScope,
) -> DomainResult<IdempotencyBegin> {
    for _ in 0..2 {
        let now = Utc::now();
        let res = sqlx::query(
            r#"
            insert into idempotency_records (
              key, actor_id, method, path, request_hash, expires_at
            ) values ($1, $2, $3, $4, $5, $6)
            on conflict (key) do nothing
            "#,
        )
        .bind(key)
        .bind(scope.actor_id)
        .bind(&scope.method)
        .bind(&scope.path)
        .bind(&scope.request_hash)
        .bind(record_expiry(now))
        .execute(pool)
        .await
        .map_err(|e| db_err("idempotency claim", e))?;

        if res.rows_affected() == 1 {
            return Ok(IdempotencyBegin::Claimed);
        }

        // Somebody holds the key; load their record and decide.
        let row = sqlx::query(
            r#"
            select key, actor_id, method, path, request_hash,
                   response_status, response_body, expires_at
            from idempotency_records
            where key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_err("idempotency lookup", e))?;

        let Some(row) = row else {
            // Deleted between our insert and select; claim again.
            continue;
        };

        let record = StoredRecord {
            key: key.to_string(),
            scope: RequestScope {
                actor_id: row
                    .try_get("actor_id")
                    .map_err(|e| DomainError::transient(format!("actor_id decode: {e}")))?,
                method: row
                    .try_get("method")
                    .map_err(|e| DomainError::transient(format!("method decode: {e}")))?,
                path: row
                    .try_get("path")
                    .map_err(|e| DomainError::transient(format!("path decode: {e}")))?,
                request_hash: row
                    .try_get("request_hash")
                    .map_err(|e| DomainError::transient(format!("request_hash decode: {e}")))?,
            },
            response_status: row
                .try_get("response_status")
                .map_err(|e| DomainError::transient(format!("response_status decode: {e}")))?,
            response_body: row
                .try_get("response_body")
                .map_err(|e| DomainError::transient(format!("response_body decode: {e}")))?,
            expires_at: row
                .try_get("expires_at")
                .map_err(|e| DomainError::transient(format!("expires_at decode: {e}")))?,
        };

        match decide(Some(&record), scope, now) {
            Decision::Replay {
                response_status,
                response_body,
            } => {
                info!(%key, "idempotent replay served from stored response");
                return Ok(IdempotencyBegin::Replay {
                    response_status,
                    response_body,
                });
            }
            Decision::InFlight => return Ok(IdempotencyBegin::InFlight),
            Decision::ScopeMismatch => return Ok(IdempotencyBegin::ScopeConflict),
            Decision::Expired => {
                // Delete only if still expired, then take another claim round.
                sqlx::query(
                    "delete from idempotency_records where key = $1 and expires_at <= $2",
                )
                .bind(key)
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| db_err("idempotency expire-delete", e))?;
                continue;
            }
            Decision::FirstSight => unreachable!("record was present"),
        }
    }

    // Two rounds of claim/delete both lost; extremely contended key.
    Err(DomainError::conflict(format!(
        "Idempotency-Key {key} is contended; retry"
    )))
}

/// Store the terminal response for a claimed key.
pub async fn idempotency_complete(
    pool: &PgPool,
    key: &str,
    response_status: i16,
    response_body: &Value,
) -> DomainResult<()> {
    sqlx::query(
        r#"
        update idempotency_records
        set response_status = $2, response_body = $3
        where key = $1
        "#,
    )
    .bind(key)
    .bind(response_status)
    .bind(response_body)
    .execute(pool)
    .await
    .map_err(|e| db_err("idempotency complete", e))?;
    Ok(())
}

/// Release a claim whose operation ended in a retryable failure, so the
/// client's retry executes again instead of replaying a 5xx forever.
pub async fn idempotency_release(pool: &PgPool, key: &str) -> DomainResult<()> {
    sqlx::query("delete from idempotency_records where key = $1 and response_status is null")
        .bind(key)
        .execute(pool)
        .await
        .map_err(|e| db_err("idempotency release", e))?;
    Ok(())
}

/// Garbage-collect expired records. Returns how many were deleted.
pub async fn idempotency_purge_expired(pool: &PgPool) -> DomainResult<u64> {
    let res = sqlx::query("delete from idempotency_records where expires_at <= now()")
        .execute(pool)
        .await
        .map_err(|e| db_err("idempotency purge", e))?;
    Ok(res.rows_affected())
}
