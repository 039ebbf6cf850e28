//! Offer store operations. Every multi-row mutation runs in one database
//! transaction with `FOR UPDATE` locks, and re-checks the state machine on
//! the locked row, so concurrent callers serialize and the loser observes
//! the winner's status.

use chrono::Utc;
use ddk_offers::{
    authorize_and_check, counter_child_draft, validate_new_offer, CounterTerms, OfferAction,
    OfferDraft, INITIAL_STATUS,
};
use ddk_schemas::{DomainError, DomainResult, Offer, OfferStatus};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::rows::{offer_from_row, offer_type_str};
use crate::{commit, db_err, is_unique_violation};

const ACTIVE_OFFER_CONSTRAINT: &str = "uq_offers_active_per_asset_buyer";

const SELECT_OFFER: &str = r#"
    select id, asset_id, buyer_id, seller_id, amount, earnest_money,
           dd_period_days, closing_date, offer_type, status, contingencies,
           terms, notes, parent_offer_id, counter_depth, expires_at,
           created_at, updated_at
    from offers
"#;

// ---------------------------------------------------------------------------
// create / fetch / list
// ---------------------------------------------------------------------------

/// Insert a new root offer as PENDING.
///
/// The at-most-one-active-offer-per-(asset, buyer) rule is the partial
/// unique index's job: the losing insert surfaces as a Conflict.
pub async fn create_offer(pool: &PgPool, draft: &OfferDraft) -> DomainResult<Offer> {
    let now = Utc::now();
    validate_new_offer(draft, now)?;

    let id = Uuid::new_v4();
    let res = sqlx::query(
        r#"
        insert into offers (
          id, asset_id, buyer_id, seller_id, amount, earnest_money,
          dd_period_days, closing_date, offer_type, status, contingencies,
          terms, notes, parent_offer_id, counter_depth, expires_at,
          created_at, updated_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
          $16, $17, $18
        )
        "#,
    )
    .bind(id)
    .bind(draft.asset_id)
    .bind(draft.buyer_id)
    .bind(draft.seller_id)
    .bind(draft.amount)
    .bind(draft.earnest_money)
    .bind(draft.dd_period_days)
    .bind(draft.closing_date)
    .bind(offer_type_str(draft.offer_type))
    .bind(INITIAL_STATUS.as_str())
    .bind(
        serde_json::to_value(&draft.contingencies)
            .map_err(|e| DomainError::transient(format!("contingencies encode: {e}")))?,
    )
    .bind(&draft.terms)
    .bind(&draft.notes)
    .bind(draft.parent_offer_id)
    .bind(draft.counter_depth)
    .bind(draft.expires_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    if let Err(e) = res {
        if is_unique_violation(&e, Some(ACTIVE_OFFER_CONSTRAINT)) {
            return Err(DomainError::conflict(
                "an active offer already exists for this asset and buyer",
            ));
        }
        return Err(db_err("create_offer", e));
    }

    info!(offer_id = %id, asset_id = %draft.asset_id, "offer created");
    fetch_offer(pool, id).await
}

pub async fn fetch_offer(pool: &PgPool, id: Uuid) -> DomainResult<Offer> {
    let row = sqlx::query(&format!("{SELECT_OFFER} where id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => DomainError::not_found(format!("offer {id} not found")),
            other => db_err("fetch_offer", other),
        })?;
    offer_from_row(&row)
}

pub async fn list_offers_for_asset(pool: &PgPool, asset_id: Uuid) -> DomainResult<Vec<Offer>> {
    let rows = sqlx::query(&format!(
        "{SELECT_OFFER} where asset_id = $1 order by created_at desc"
    ))
    .bind(asset_id)
    .fetch_all(pool)
    .await
    .map_err(|e| db_err("list_offers_for_asset", e))?;

    rows.iter().map(offer_from_row).collect()
}

// ---------------------------------------------------------------------------
// Single-offer transitions (review / decline / withdraw)
// ---------------------------------------------------------------------------

/// Apply one state-machine action to one offer under a row lock.
/// `reason`, when given, replaces the offer's notes (decline reasons).
pub async fn transition_offer(
    pool: &PgPool,
    offer_id: Uuid,
    action: OfferAction,
    actor: Option<Uuid>,
    reason: Option<&str>,
) -> DomainResult<Offer> {
    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(|e| db_err("transition_offer begin", e))?;

    let row = sqlx::query(&format!("{SELECT_OFFER} where id = $1 for update"))
        .bind(offer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DomainError::not_found(format!("offer {offer_id} not found"))
            }
            other => db_err("transition_offer lock", other),
        })?;
    let mut offer = offer_from_row(&row)?;

    let target = authorize_and_check(&offer, action, actor, now)?;

    sqlx::query(
        r#"
        update offers
        set status = $2,
            notes = coalesce($3, notes),
            updated_at = $4
        where id = $1
        "#,
    )
    .bind(offer_id)
    .bind(target.as_str())
    .bind(reason)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_err("transition_offer update", e))?;

    commit(tx, "transition_offer").await?;

    info!(offer_id = %offer_id, from = %offer.status, to = %target, "offer transition");
    offer.status = target;
    if let Some(r) = reason {
        offer.notes = Some(r.to_string());
    }
    offer.updated_at = now;
    Ok(offer)
}

// ---------------------------------------------------------------------------
// accept — with atomic sibling-decline fan-out
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub offer: Offer,
    pub declined_sibling_ids: Vec<Uuid>,
}

/// Accept an offer and decline every other active offer on the same asset,
/// in one database transaction.
///
/// All affected rows are locked before any write, so no reader committed
/// after this transaction can observe two ACCEPTED offers on one asset, nor
/// an accepted offer with still-active siblings. A concurrent accept on the
/// same offer blocks on the row lock and then fails the state check with a
/// Conflict naming the now-ACCEPTED status.
pub async fn accept_offer(pool: &PgPool, offer_id: Uuid, actor: Uuid) -> DomainResult<AcceptOutcome> {
    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(|e| db_err("accept_offer begin", e))?;

    let row = sqlx::query(&format!("{SELECT_OFFER} where id = $1 for update"))
        .bind(offer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DomainError::not_found(format!("offer {offer_id} not found"))
            }
            other => db_err("accept_offer lock", other),
        })?;
    let mut offer = offer_from_row(&row)?;

    authorize_and_check(&offer, OfferAction::Accept, Some(actor), now)?;

    // Lock the active siblings before touching anything.
    let sibling_rows = sqlx::query(
        r#"
        select id from offers
        where asset_id = $1
          and id <> $2
          and status in ('PENDING','UNDER_REVIEW')
        for update
        "#,
    )
    .bind(offer.asset_id)
    .bind(offer_id)
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| db_err("accept_offer lock siblings", e))?;

    let declined_sibling_ids: Vec<Uuid> = sibling_rows
        .iter()
        .map(|r| {
            sqlx::Row::try_get(r, "id")
                .map_err(|e| DomainError::transient(format!("sibling id decode: {e}")))
        })
        .collect::<DomainResult<_>>()?;

    sqlx::query("update offers set status = 'ACCEPTED', updated_at = $2 where id = $1")
        .bind(offer_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("accept_offer update", e))?;

    if !declined_sibling_ids.is_empty() {
        sqlx::query(
            "update offers set status = 'DECLINED', updated_at = $2 where id = any($1)",
        )
        .bind(&declined_sibling_ids)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("accept_offer decline siblings", e))?;
    }

    commit(tx, "accept_offer").await?;

    info!(
        offer_id = %offer_id,
        declined = declined_sibling_ids.len(),
        "offer accepted, siblings declined"
    );
    offer.status = OfferStatus::Accepted;
    offer.updated_at = now;
    Ok(AcceptOutcome {
        offer,
        declined_sibling_ids,
    })
}

// ---------------------------------------------------------------------------
// counter — parent to COUNTERED + child PENDING, atomically
// ---------------------------------------------------------------------------

/// Counter an offer: parent flips to COUNTERED and a linked PENDING child is
/// inserted in the same transaction. The parent is updated first so the
/// partial unique index never sees two active offers for the pair.
pub async fn counter_offer(
    pool: &PgPool,
    parent_id: Uuid,
    actor: Uuid,
    terms: &CounterTerms,
) -> DomainResult<(Offer, Offer)> {
    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(|e| db_err("counter_offer begin", e))?;

    let row = sqlx::query(&format!("{SELECT_OFFER} where id = $1 for update"))
        .bind(parent_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DomainError::not_found(format!("offer {parent_id} not found"))
            }
            other => db_err("counter_offer lock", other),
        })?;
    let mut parent = offer_from_row(&row)?;

    authorize_and_check(&parent, OfferAction::Counter, Some(actor), now)?;
    let child_draft = counter_child_draft(&parent, terms, now)?;

    sqlx::query("update offers set status = 'COUNTERED', updated_at = $2 where id = $1")
        .bind(parent_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("counter_offer update parent", e))?;

    let child_id = Uuid::new_v4();
    sqlx::query(
        r#"
        insert into offers (
          id, asset_id, buyer_id, seller_id, amount, earnest_money,
          dd_period_days, closing_date, offer_type, status, contingencies,
          terms, notes, parent_offer_id, counter_depth, expires_at,
          created_at, updated_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, 'PENDING', $10, $11, $12, $13,
          $14, $15, $16, $17
        )
        "#,
    )
    .bind(child_id)
    .bind(child_draft.asset_id)
    .bind(child_draft.buyer_id)
    .bind(child_draft.seller_id)
    .bind(child_draft.amount)
    .bind(child_draft.earnest_money)
    .bind(child_draft.dd_period_days)
    .bind(child_draft.closing_date)
    .bind(offer_type_str(child_draft.offer_type))
    .bind(
        serde_json::to_value(&child_draft.contingencies)
            .map_err(|e| DomainError::transient(format!("contingencies encode: {e}")))?,
    )
    .bind(&child_draft.terms)
    .bind(&child_draft.notes)
    .bind(child_draft.parent_offer_id)
    .bind(child_draft.counter_depth)
    .bind(child_draft.expires_at)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_err("counter_offer insert child", e))?;

    commit(tx, "counter_offer").await?;

    info!(parent_id = %parent_id, child_id = %child_id, "counter-offer created");
    parent.status = OfferStatus::Countered;
    parent.updated_at = now;
    let child = fetch_offer(pool, child_id).await?;
    Ok((parent, child))
}

// ---------------------------------------------------------------------------
// Expiry sweep
// ---------------------------------------------------------------------------

/// Flip every active offer whose expiry has passed to EXPIRED. Run before
/// list queries and on the daemon interval. Returns how many were expired.
pub async fn sweep_expired_offers(pool: &PgPool) -> DomainResult<u64> {
    let res = sqlx::query(
        r#"
        update offers
        set status = 'EXPIRED', updated_at = now()
        where status in ('PENDING','UNDER_REVIEW')
          and expires_at is not null
          and expires_at <= now()
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| db_err("sweep_expired_offers", e))?;

    let n = res.rows_affected();
    if n > 0 {
        info!(count = n, "expired offers swept");
    }
    Ok(n)
}
