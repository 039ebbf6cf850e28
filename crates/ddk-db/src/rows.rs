//! Row -> entity mapping. One function per entity so every query in the
//! crate decodes identically.

use ddk_schemas::{
    DomainError, DomainResult, FeeCategory, Offer, OfferStatus, OfferType, Transaction,
    TransactionStatus,
};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::BTreeMap;

pub(crate) fn offer_from_row(row: &PgRow) -> DomainResult<Offer> {
    let status: String = get(row, "status")?;
    let offer_type: String = get(row, "offer_type")?;
    let contingencies: Value = get(row, "contingencies")?;

    Ok(Offer {
        id: get(row, "id")?,
        asset_id: get(row, "asset_id")?,
        buyer_id: get(row, "buyer_id")?,
        seller_id: get(row, "seller_id")?,
        amount: get(row, "amount")?,
        earnest_money: get(row, "earnest_money")?,
        dd_period_days: get(row, "dd_period_days")?,
        closing_date: get(row, "closing_date")?,
        offer_type: parse_offer_type(&offer_type)?,
        status: OfferStatus::parse(&status)?,
        contingencies: serde_json::from_value(contingencies)
            .map_err(|e| DomainError::transient(format!("offer contingencies corrupt: {e}")))?,
        terms: get(row, "terms")?,
        notes: get(row, "notes")?,
        parent_offer_id: get(row, "parent_offer_id")?,
        counter_depth: get(row, "counter_depth")?,
        expires_at: get(row, "expires_at")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn transaction_from_row(row: &PgRow) -> DomainResult<Transaction> {
    let status: String = get(row, "status")?;

    Ok(Transaction {
        id: get(row, "id")?,
        offer_id: get(row, "offer_id")?,
        asset_id: get(row, "asset_id")?,
        buyer_id: get(row, "buyer_id")?,
        seller_id: get(row, "seller_id")?,
        purchase_price: get(row, "purchase_price")?,
        earnest_amount: get(row, "earnest_amount")?,
        earnest_deposited_at: get(row, "earnest_deposited_at")?,
        dd_period_days: get(row, "dd_period_days")?,
        dd_completed_at: get(row, "dd_completed_at")?,
        closing_date: get(row, "closing_date")?,
        status: TransactionStatus::parse(&status)?,
        platform_fee: get(row, "platform_fee")?,
        integrator_fee: get(row, "integrator_fee")?,
        creator_amount: get(row, "creator_amount")?,
        prorations: get(row, "prorations")?,
        adjustments: get(row, "adjustments")?,
        net_proceeds: get(row, "net_proceeds")?,
        settlement_statement: get(row, "settlement_statement")?,
        on_chain_tx_hash: get(row, "on_chain_tx_hash")?,
        closed_at: get(row, "closed_at")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn parse_offer_type(s: &str) -> DomainResult<OfferType> {
    match s {
        "CASH" => Ok(OfferType::Cash),
        "FINANCED" => Ok(OfferType::Financed),
        "HYBRID" => Ok(OfferType::Hybrid),
        other => Err(DomainError::validation(format!("invalid offer type: {other}"))),
    }
}

pub(crate) fn offer_type_str(t: OfferType) -> &'static str {
    match t {
        OfferType::Cash => "CASH",
        OfferType::Financed => "FINANCED",
        OfferType::Hybrid => "HYBRID",
    }
}

pub(crate) fn fee_category_from_str(s: &str) -> FeeCategory {
    FeeCategory::parse(s).unwrap_or(FeeCategory::Standard)
}

/// jsonb object of name -> integer amount. Non-integer values are dropped
/// rather than failing the whole settlement.
pub(crate) fn amount_map(v: &Value) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = v {
        for (k, val) in map {
            if let Some(n) = val.as_i64() {
                out.insert(k.clone(), n);
            }
        }
    }
    out
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> DomainResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| DomainError::transient(format!("column {column}: decode failed: {e}")))
}
