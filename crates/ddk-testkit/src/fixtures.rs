//! Entity fixtures shared by scenario tests across crates.

use chrono::Utc;
use ddk_schemas::{Offer, OfferStatus, OfferType, Transaction, TransactionStatus};
use serde_json::json;
use uuid::Uuid;

/// A PENDING root offer with fresh random parties.
pub fn offer_fixture(amount: i64) -> Offer {
    let now = Utc::now();
    Offer {
        id: Uuid::new_v4(),
        asset_id: Uuid::new_v4(),
        buyer_id: Uuid::new_v4(),
        seller_id: Uuid::new_v4(),
        amount,
        earnest_money: Some(amount / 10),
        dd_period_days: Some(14),
        closing_date: None,
        offer_type: OfferType::Cash,
        status: OfferStatus::Pending,
        contingencies: vec![],
        terms: json!({}),
        notes: None,
        parent_offer_id: None,
        counter_depth: 0,
        expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn accepted_offer(amount: i64) -> Offer {
    let mut o = offer_fixture(amount);
    o.status = OfferStatus::Accepted;
    o
}

/// A transaction in the given status, derived from an accepted offer.
pub fn transaction_fixture(offer: &Offer, status: TransactionStatus) -> Transaction {
    let now = Utc::now();
    Transaction {
        id: Uuid::new_v4(),
        offer_id: offer.id,
        asset_id: offer.asset_id,
        buyer_id: offer.buyer_id,
        seller_id: offer.seller_id,
        purchase_price: offer.amount,
        earnest_amount: None,
        earnest_deposited_at: None,
        dd_period_days: offer.dd_period_days,
        dd_completed_at: None,
        closing_date: offer.closing_date,
        status,
        platform_fee: 0,
        integrator_fee: 0,
        creator_amount: offer.amount,
        prorations: json!({}),
        adjustments: json!({}),
        net_proceeds: offer.amount,
        settlement_statement: None,
        on_chain_tx_hash: None,
        closed_at: None,
        created_at: now,
        updated_at: now,
    }
}
