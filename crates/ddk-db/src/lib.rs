//! ddk-db
//!
//! All Postgres access. Free async functions over `&PgPool`, raw
//! `sqlx::query` with explicit binds and `try_get` row mapping. Every
//! multi-row invariant lives here, inside single database transactions
//! with `FOR UPDATE` row locks:
//!
//! - accept + sibling-decline fan-out (one transaction, no partial window)
//! - close + settlement recompute + statement snapshot (one transaction)
//! - idempotency pre-claim via the primary key on `idempotency_records.key`
//!
//! Domain-facing functions return `DomainResult` so callers surface the
//! right HTTP status; plumbing (connect, migrate) stays on `anyhow`.

use anyhow::{Context, Result};
use ddk_schemas::{DomainError, DomainResult};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod idempotency;
mod offers;
mod rows;
mod saga_ports;
mod transactions;

pub use idempotency::{
    idempotency_begin, idempotency_complete, idempotency_purge_expired, idempotency_release,
    IdempotencyBegin,
};
pub use offers::{
    accept_offer, counter_offer, create_offer, fetch_offer, list_offers_for_asset,
    sweep_expired_offers, transition_offer, AcceptOutcome,
};
pub use saga_ports::{pg_saga_ports, seed_catalog_asset, upsert_fee_structure};
pub use transactions::{
    close_transaction, create_transaction, fetch_transaction, transition_transaction,
    update_transaction_status,
};

pub const ENV_DB_URL: &str = "DDK_DATABASE_URL";

/// Connect to Postgres using DDK_DATABASE_URL.
pub async fn connect_from_env(max_connections: u32) -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity + schema presence, for /v1/status and `ddk status`.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='offers'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_schema: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_schema: bool,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// RowNotFound keeps its meaning; everything else from the driver is a
/// transient infrastructure failure (retryable, 500).
pub(crate) fn db_err(what: &str, e: sqlx::Error) -> DomainError {
    match e {
        sqlx::Error::RowNotFound => DomainError::not_found(format!("{what}: not found")),
        other => DomainError::transient(format!("{what}: database error: {other}")),
    }
}

/// Detect a Postgres unique constraint violation, optionally by name.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code_matches = db_err.code().as_deref() == Some("23505");
            match constraint {
                Some(name) => code_matches && db_err.constraint() == Some(name),
                None => code_matches,
            }
        }
        _ => false,
    }
}

/// Commit helper: a failed commit is transient (caller may retry the whole
/// operation; nothing was applied).
pub(crate) async fn commit(
    tx: sqlx::Transaction<'_, sqlx::Postgres>,
    what: &str,
) -> DomainResult<()> {
    tx.commit()
        .await
        .map_err(|e| DomainError::transient(format!("{what}: commit failed: {e}")))
}
