//! Settlement statement snapshot builder.
//!
//! The statement is a plain JSON document written exactly once when a
//! transaction closes. Field names are fixed wire-contract camelCase;
//! downstream consumers (statements UI, exports) parse this shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ddk_schemas::FeeCategory;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::calculator::{FeeRates, Settlement};

/// Context the calculator itself does not know: who the parties are and when
/// the snapshot is taken.
#[derive(Debug, Clone)]
pub struct StatementContext {
    pub transaction_id: Uuid,
    pub asset_id: Uuid,
    pub buyer_name: String,
    pub seller_name: String,
    pub closing_date: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
    pub earnest_amount: Option<i64>,
    pub category: FeeCategory,
    pub rates: FeeRates,
}

/// Build the immutable settlement statement for a closed transaction.
pub fn build_statement(
    ctx: &StatementContext,
    settlement: &Settlement,
    prorations: &BTreeMap<String, i64>,
    adjustments: &BTreeMap<String, i64>,
) -> Value {
    json!({
        "transactionId": ctx.transaction_id,
        "buyerName": ctx.buyer_name,
        "sellerName": ctx.seller_name,
        "assetId": ctx.asset_id,
        "closingDate": ctx.closing_date,
        "generatedAt": ctx.generated_at,
        "purchasePrice": settlement.purchase_price,
        "earnestAmount": ctx.earnest_amount,
        "fees": {
            "platformFee": settlement.platform_fee,
            "integratorFee": settlement.integrator_fee,
            "totalFees": settlement.platform_fee + settlement.integrator_fee,
        },
        "prorations": prorations,
        "adjustments": adjustments,
        "totals": {
            "totalProrations": settlement.total_prorations,
            "totalAdjustments": settlement.total_adjustments,
            "grossProceeds": settlement.creator_amount,
            "netProceeds": settlement.net_proceeds,
        },
        "breakdown": {
            "category": ctx.category.as_str(),
            "platformFeeBps": ctx.rates.platform_bps,
            "integratorFeeBps": ctx.rates.integrator_bps,
            "feeBasis": 10_000 + ctx.rates.platform_bps + ctx.rates.integrator_bps,
        },
    })
}
