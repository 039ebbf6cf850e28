//! Transaction store operations: creation from an accepted offer, locked
//! lifecycle transitions, and the atomic close (settlement recompute +
//! immutable statement snapshot + status flip in one database transaction).

use chrono::Utc;
use ddk_schemas::{DomainError, DomainResult, FeeCategory, Transaction, TransactionStatus};
use ddk_settlement::{
    build_statement, compute_settlement, FeeRates, SettlementInputs, StatementContext,
};
use ddk_transactions::{
    authorize_and_check, check_explicit_target, validate_create, validate_earnest_amount, TxAction,
};
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::rows::{amount_map, fee_category_from_str, offer_from_row, transaction_from_row};
use crate::{commit, db_err, is_unique_violation};

const SELECT_TX: &str = r#"
    select id, offer_id, asset_id, buyer_id, seller_id, purchase_price,
           earnest_amount, earnest_deposited_at, dd_period_days,
           dd_completed_at, closing_date, status, platform_fee,
           integrator_fee, creator_amount, prorations, adjustments,
           net_proceeds, settlement_statement, on_chain_tx_hash, closed_at,
           created_at, updated_at
    from transactions
"#;

// ---------------------------------------------------------------------------
// Fee inputs
// ---------------------------------------------------------------------------

/// Resolve (category, rates) for an asset. An asset missing from the catalog
/// gets the paid default category; a missing or failing fee-structure lookup
/// falls back to platform default rates (logged inside `resolve_lookup`).
async fn fee_inputs_for_asset(
    conn: &mut PgConnection,
    asset_id: Uuid,
) -> DomainResult<(FeeCategory, FeeRates)> {
    let asset_row = sqlx::query(
        "select organization_id, fee_category from catalog_assets where asset_id = $1",
    )
    .bind(asset_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_err("fee_inputs asset lookup", e))?;

    let Some(asset_row) = asset_row else {
        tracing::warn!(%asset_id, "asset not in catalog; using default category and rates");
        return Ok((FeeCategory::Standard, FeeRates::platform_default()));
    };

    let organization_id: Uuid = asset_row
        .try_get("organization_id")
        .map_err(|e| DomainError::transient(format!("organization_id decode: {e}")))?;
    let category_raw: String = asset_row
        .try_get("fee_category")
        .map_err(|e| DomainError::transient(format!("fee_category decode: {e}")))?;
    let category = fee_category_from_str(&category_raw);

    let fee_row = sqlx::query(
        "select platform_fee_bps, integrator_fee_bps from fee_structures where organization_id = $1",
    )
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await;

    let looked_up: anyhow::Result<Option<FeeRates>> = match fee_row {
        Err(e) => Err(e.into()),
        Ok(None) => Ok(None),
        Ok(Some(r)) => {
            let platform = r.try_get::<i64, _>("platform_fee_bps");
            let integrator = r.try_get::<i64, _>("integrator_fee_bps");
            match (platform, integrator) {
                (Ok(platform_bps), Ok(integrator_bps)) => Ok(Some(FeeRates {
                    platform_bps,
                    integrator_bps,
                })),
                (Err(e), _) | (_, Err(e)) => Err(e.into()),
            }
        }
    };

    Ok((category, FeeRates::resolve_lookup(organization_id, looked_up)))
}

async fn participant_name(conn: &mut PgConnection, id: Uuid) -> DomainResult<String> {
    let row = sqlx::query("select display_name from participants where id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err("participant_name", e))?;
    match row {
        Some(r) => r
            .try_get("display_name")
            .map_err(|e| DomainError::transient(format!("display_name decode: {e}"))),
        None => Ok(id.to_string()),
    }
}

// ---------------------------------------------------------------------------
// create / fetch
// ---------------------------------------------------------------------------

/// Create the Transaction for an ACCEPTED offer and populate its initial fee
/// fields from the settlement calculator. Exactly one Transaction may ever
/// exist per offer — the unique index on offer_id arbitrates races.
pub async fn create_transaction(
    pool: &PgPool,
    offer_id: Uuid,
    actor: Uuid,
) -> DomainResult<Transaction> {
    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| db_err("create_transaction begin", e))?;

    let offer_row = sqlx::query(
        r#"
        select id, asset_id, buyer_id, seller_id, amount, earnest_money,
               dd_period_days, closing_date, offer_type, status,
               contingencies, terms, notes, parent_offer_id, counter_depth,
               expires_at, created_at, updated_at
        from offers where id = $1 for update
        "#,
    )
    .bind(offer_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match e {
        sqlx::Error::RowNotFound => DomainError::not_found(format!("offer {offer_id} not found")),
        other => db_err("create_transaction lock offer", other),
    })?;
    let offer = offer_from_row(&offer_row)?;

    validate_create(&offer, actor)?;

    let (category, rates) = fee_inputs_for_asset(&mut *tx, offer.asset_id).await?;
    let settlement = compute_settlement(&SettlementInputs {
        purchase_price: offer.amount,
        category,
        rates,
        prorations: Default::default(),
        adjustments: Default::default(),
    });

    let id = Uuid::new_v4();
    let res = sqlx::query(
        r#"
        insert into transactions (
          id, offer_id, asset_id, buyer_id, seller_id, purchase_price,
          earnest_amount, dd_period_days, closing_date, status,
          platform_fee, integrator_fee, creator_amount, net_proceeds,
          created_at, updated_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, 'PENDING', $10, $11, $12, $13,
          $14, $15
        )
        "#,
    )
    .bind(id)
    .bind(offer.id)
    .bind(offer.asset_id)
    .bind(offer.buyer_id)
    .bind(offer.seller_id)
    .bind(offer.amount)
    .bind(offer.earnest_money)
    .bind(offer.dd_period_days)
    .bind(offer.closing_date)
    .bind(settlement.platform_fee)
    .bind(settlement.integrator_fee)
    .bind(settlement.creator_amount)
    .bind(settlement.net_proceeds)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await;

    if let Err(e) = res {
        if is_unique_violation(&e, None) {
            return Err(DomainError::conflict(format!(
                "a transaction already exists for offer {offer_id}"
            )));
        }
        return Err(db_err("create_transaction insert", e));
    }

    commit(tx, "create_transaction").await?;
    info!(transaction_id = %id, offer_id = %offer_id, "transaction created");
    fetch_transaction(pool, id).await
}

pub async fn fetch_transaction(pool: &PgPool, id: Uuid) -> DomainResult<Transaction> {
    let row = sqlx::query(&format!("{SELECT_TX} where id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DomainError::not_found(format!("transaction {id} not found"))
            }
            other => db_err("fetch_transaction", other),
        })?;
    transaction_from_row(&row)
}

// ---------------------------------------------------------------------------
// Lifecycle transitions (everything except close)
// ---------------------------------------------------------------------------

/// Apply one non-closing lifecycle action under a row lock.
/// `earnest_amount` is required for [`TxAction::DepositEarnest`] and ignored
/// otherwise.
pub async fn transition_transaction(
    pool: &PgPool,
    transaction_id: Uuid,
    action: TxAction,
    actor: Uuid,
    earnest_amount: Option<i64>,
) -> DomainResult<Transaction> {
    if action == TxAction::Close {
        return close_transaction(pool, transaction_id, actor).await;
    }

    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| db_err("transition_transaction begin", e))?;

    let row = sqlx::query(&format!("{SELECT_TX} where id = $1 for update"))
        .bind(transaction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DomainError::not_found(format!("transaction {transaction_id} not found"))
            }
            other => db_err("transition_transaction lock", other),
        })?;
    let record = transaction_from_row(&row)?;

    let target = authorize_and_check(&record, action, actor)?;

    match action {
        TxAction::DepositEarnest => {
            let amount = earnest_amount.ok_or_else(|| {
                DomainError::validation("earnest amount is required to deposit earnest")
            })?;
            validate_earnest_amount(amount, record.purchase_price)?;
            sqlx::query(
                r#"
                update transactions
                set status = $2, earnest_amount = $3, earnest_deposited_at = $4,
                    updated_at = $4
                where id = $1
                "#,
            )
            .bind(transaction_id)
            .bind(target.as_str())
            .bind(amount)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("deposit_earnest update", e))?;
        }
        TxAction::CompleteDueDiligence => {
            sqlx::query(
                r#"
                update transactions
                set status = $2, dd_completed_at = $3, updated_at = $3
                where id = $1
                "#,
            )
            .bind(transaction_id)
            .bind(target.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("complete_due_diligence update", e))?;
        }
        TxAction::Fund | TxAction::Cancel | TxAction::Fail => {
            sqlx::query(
                "update transactions set status = $2, updated_at = $3 where id = $1",
            )
            .bind(transaction_id)
            .bind(target.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("transition update", e))?;
        }
        TxAction::Close => unreachable!("close handled above"),
    }

    commit(tx, "transition_transaction").await?;
    info!(
        transaction_id = %transaction_id,
        from = %record.status,
        to = %target,
        "transaction transition"
    );
    fetch_transaction(pool, transaction_id).await
}

// ---------------------------------------------------------------------------
// close — settlement recompute + immutable statement, atomically
// ---------------------------------------------------------------------------

/// Close a FUNDING transaction: recompute settlement with the current
/// prorations/adjustments, write the settlement statement snapshot, flip to
/// CLOSED and stamp closed_at — all in one database transaction under a row
/// lock. The statement is write-once by construction: the only path here is
/// FUNDING → CLOSED, and CLOSED is terminal.
pub async fn close_transaction(
    pool: &PgPool,
    transaction_id: Uuid,
    actor: Uuid,
) -> DomainResult<Transaction> {
    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| db_err("close_transaction begin", e))?;

    let row = sqlx::query(&format!("{SELECT_TX} where id = $1 for update"))
        .bind(transaction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DomainError::not_found(format!("transaction {transaction_id} not found"))
            }
            other => db_err("close_transaction lock", other),
        })?;
    let record = transaction_from_row(&row)?;

    authorize_and_check(&record, TxAction::Close, actor)?;

    let (category, rates) = fee_inputs_for_asset(&mut *tx, record.asset_id).await?;
    let prorations = amount_map(&record.prorations);
    let adjustments = amount_map(&record.adjustments);
    let settlement = compute_settlement(&SettlementInputs {
        purchase_price: record.purchase_price,
        category,
        rates,
        prorations: prorations.clone(),
        adjustments: adjustments.clone(),
    });

    let buyer_name = participant_name(&mut *tx, record.buyer_id).await?;
    let seller_name = participant_name(&mut *tx, record.seller_id).await?;
    let statement = build_statement(
        &StatementContext {
            transaction_id,
            asset_id: record.asset_id,
            buyer_name,
            seller_name,
            closing_date: record.closing_date,
            generated_at: now,
            earnest_amount: record.earnest_amount,
            category,
            rates,
        },
        &settlement,
        &prorations,
        &adjustments,
    );

    sqlx::query(
        r#"
        update transactions
        set status = 'CLOSED',
            platform_fee = $2,
            integrator_fee = $3,
            creator_amount = $4,
            net_proceeds = $5,
            settlement_statement = $6,
            closed_at = $7,
            updated_at = $7
        where id = $1
        "#,
    )
    .bind(transaction_id)
    .bind(settlement.platform_fee)
    .bind(settlement.integrator_fee)
    .bind(settlement.creator_amount)
    .bind(settlement.net_proceeds)
    .bind(&statement)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_err("close_transaction update", e))?;

    commit(tx, "close_transaction").await?;
    info!(transaction_id = %transaction_id, net_proceeds = settlement.net_proceeds, "transaction closed");
    fetch_transaction(pool, transaction_id).await
}

// ---------------------------------------------------------------------------
// Explicit status updates
// ---------------------------------------------------------------------------

/// `update_status` with a caller-named target: resolved to the matching
/// action (rejecting anything not in the transition table), then dispatched
/// through the same locked paths as the named operations.
pub async fn update_transaction_status(
    pool: &PgPool,
    transaction_id: Uuid,
    target: TransactionStatus,
    actor: Uuid,
    earnest_amount: Option<i64>,
) -> DomainResult<Transaction> {
    let current = fetch_transaction(pool, transaction_id).await?;
    let action = check_explicit_target(&current, target, actor)?;
    transition_transaction(pool, transaction_id, action, actor, earnest_amount).await
}
