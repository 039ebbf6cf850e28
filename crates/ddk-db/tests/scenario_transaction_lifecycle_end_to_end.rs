//! Full happy path: offer → accept → transaction → earnest → due diligence
//! → fund → close, with the settlement statement checked against the fee
//! formula, plus the illegal-transition and explicit-status paths.
//!
//! Requires DDK_DATABASE_URL.

use ddk_offers::OfferDraft;
use ddk_schemas::{FeeCategory, OfferType, TransactionStatus};
use ddk_transactions::TxAction;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("DDK_DATABASE_URL")
        .expect("DB tests require DDK_DATABASE_URL; run with -- --include-ignored");
    let pool = PgPool::connect(&url).await.expect("connect");
    ddk_db::migrate(&pool).await.expect("migrate");
    pool
}

fn draft(asset_id: Uuid, buyer: Uuid, seller: Uuid) -> OfferDraft {
    OfferDraft {
        asset_id,
        buyer_id: buyer,
        seller_id: seller,
        amount: 100_000,
        earnest_money: Some(10_000),
        dd_period_days: Some(14),
        closing_date: None,
        offer_type: OfferType::Cash,
        contingencies: vec![],
        terms: json!({}),
        notes: None,
        parent_offer_id: None,
        counter_depth: 0,
        expires_at: None,
    }
}

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn paid_tier_deal_closes_with_exact_settlement() {
    let pool = test_pool().await;
    let asset_id = Uuid::new_v4();
    let org_id = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    ddk_db::seed_catalog_asset(&pool, asset_id, org_id, FeeCategory::Standard)
        .await
        .expect("seed asset");
    ddk_db::upsert_fee_structure(&pool, org_id, 500, 100)
        .await
        .expect("seed fees");

    let offer = ddk_db::create_offer(&pool, &draft(asset_id, buyer, seller))
        .await
        .expect("offer");
    ddk_db::accept_offer(&pool, offer.id, seller).await.expect("accept");

    let tx = ddk_db::create_transaction(&pool, offer.id, buyer)
        .await
        .expect("transaction");
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.purchase_price, 100_000);
    // 500/100 bps against the inclusive 10600 denominator.
    assert_eq!(tx.platform_fee, 4_717);
    assert_eq!(tx.integrator_fee, 943);
    assert_eq!(tx.creator_amount, 94_340);
    assert_eq!(tx.platform_fee + tx.integrator_fee + tx.creator_amount, 100_000);

    // Only one transaction per offer, ever.
    let err = ddk_db::create_transaction(&pool, offer.id, seller).await.unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");

    let tx1 = ddk_db::transition_transaction(&pool, tx.id, TxAction::DepositEarnest, buyer, Some(10_000))
        .await
        .expect("earnest");
    assert_eq!(tx1.status, TransactionStatus::EarnestDeposited);
    assert_eq!(tx1.earnest_amount, Some(10_000));
    assert!(tx1.earnest_deposited_at.is_some());

    let tx2 = ddk_db::transition_transaction(&pool, tx.id, TxAction::CompleteDueDiligence, seller, None)
        .await
        .expect("dd");
    assert_eq!(tx2.status, TransactionStatus::DueDiligence);
    assert!(tx2.dd_completed_at.is_some());

    let tx3 = ddk_db::transition_transaction(&pool, tx.id, TxAction::Fund, buyer, None)
        .await
        .expect("fund");
    assert_eq!(tx3.status, TransactionStatus::Funding);

    let closed = ddk_db::close_transaction(&pool, tx.id, seller).await.expect("close");
    assert_eq!(closed.status, TransactionStatus::Closed);
    assert!(closed.closed_at.is_some());
    assert_eq!(closed.net_proceeds, 94_340);

    let statement = closed.settlement_statement.expect("statement written");
    assert_eq!(statement["purchasePrice"], 100_000);
    assert_eq!(statement["earnestAmount"], 10_000);
    assert_eq!(statement["fees"]["platformFee"], 4_717);
    assert_eq!(statement["fees"]["integratorFee"], 943);
    assert_eq!(statement["fees"]["totalFees"], 5_660);
    assert_eq!(statement["totals"]["grossProceeds"], 94_340);
    assert_eq!(statement["totals"]["netProceeds"], 94_340);
    assert_eq!(statement["breakdown"]["platformFeeBps"], 500);

    // Terminal: nothing moves a CLOSED deal.
    let err = ddk_db::transition_transaction(&pool, tx.id, TxAction::Cancel, buyer, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");
    assert!(err.message().contains("CLOSED"));
    assert!(err.message().contains("CANCELLED"));
}

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn free_tier_deal_pays_no_fees() {
    let pool = test_pool().await;
    let asset_id = Uuid::new_v4();
    let org_id = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    ddk_db::seed_catalog_asset(&pool, asset_id, org_id, FeeCategory::Community)
        .await
        .expect("seed asset");
    ddk_db::upsert_fee_structure(&pool, org_id, 500, 100)
        .await
        .expect("seed fees");

    let offer = ddk_db::create_offer(&pool, &draft(asset_id, buyer, seller))
        .await
        .expect("offer");
    ddk_db::accept_offer(&pool, offer.id, seller).await.expect("accept");

    let tx = ddk_db::create_transaction(&pool, offer.id, buyer)
        .await
        .expect("transaction");
    assert_eq!(tx.platform_fee, 0);
    assert_eq!(tx.integrator_fee, 0);
    assert_eq!(tx.creator_amount, 100_000);
}

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn explicit_status_update_follows_the_table() {
    let pool = test_pool().await;
    let asset_id = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let offer = ddk_db::create_offer(&pool, &draft(asset_id, buyer, seller))
        .await
        .expect("offer");
    ddk_db::accept_offer(&pool, offer.id, seller).await.expect("accept");
    let tx = ddk_db::create_transaction(&pool, offer.id, buyer)
        .await
        .expect("transaction");

    // PENDING -> CLOSED is not an edge; the message names both states.
    let err = ddk_db::update_transaction_status(
        &pool,
        tx.id,
        TransactionStatus::Closed,
        buyer,
        None,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");
    assert!(err.message().contains("PENDING"));
    assert!(err.message().contains("CLOSED"));

    // PENDING -> EARNEST_DEPOSITED via the explicit path works with amount.
    let updated = ddk_db::update_transaction_status(
        &pool,
        tx.id,
        TransactionStatus::EarnestDeposited,
        buyer,
        Some(5_000),
    )
    .await
    .expect("explicit earnest");
    assert_eq!(updated.status, TransactionStatus::EarnestDeposited);

    // Cancel from a pre-FUNDING state.
    let cancelled = ddk_db::update_transaction_status(
        &pool,
        tx.id,
        TransactionStatus::Cancelled,
        seller,
        None,
    )
    .await
    .expect("cancel");
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
}
