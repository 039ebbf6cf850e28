//! ddk-schemas
//!
//! Shared domain types for DealDesk: the Offer / Transaction entities, their
//! status enums, the error taxonomy every crate speaks, and the wire DTOs for
//! the two inbound job-outcome channels.
//!
//! This crate is deliberately dependency-light (serde + ids + time only) so
//! every other crate can depend on it without dragging in I/O stacks.

mod error;
mod events;
mod status;

pub use error::{DomainError, DomainResult, ErrorBody};
pub use events::{ChainEventMessage, StorageJobNotice, StorageJobRecord};
pub use status::{FeeCategory, OfferStatus, TransactionStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

/// How the buyer intends to pay. Opaque to the lifecycle logic; carried
/// through to the settlement statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferType {
    Cash,
    Financed,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContingencyKind {
    Inspection,
    Financing,
    Appraisal,
    TitleReview,
    Other,
}

/// A condition the deal is contingent on (e.g. a passed inspection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contingency {
    pub kind: ContingencyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
}

/// A buyer's proposal to purchase an asset under stated terms.
///
/// Amounts are i64 minor units. `parent_offer_id` links a counter-offer to
/// the offer it supersedes; the chain is forward-only and `counter_depth`
/// bounds its length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount: i64,
    pub earnest_money: Option<i64>,
    pub dd_period_days: Option<i32>,
    pub closing_date: Option<DateTime<Utc>>,
    pub offer_type: OfferType,
    pub status: OfferStatus,
    pub contingencies: Vec<Contingency>,
    /// Free-form negotiated terms; never interpreted by the lifecycle logic.
    pub terms: Value,
    pub notes: Option<String>,
    pub parent_offer_id: Option<Uuid>,
    /// 0 for a root offer; parent's depth + 1 for a counter.
    pub counter_depth: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    /// True when `expires_at` is set and has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// The binding deal created from an accepted Offer, tracked through closing.
///
/// Fee fields are populated at creation and recomputed once more inside the
/// close transaction; `settlement_statement` is write-once at CLOSED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub asset_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub purchase_price: i64,
    pub earnest_amount: Option<i64>,
    pub earnest_deposited_at: Option<DateTime<Utc>>,
    pub dd_period_days: Option<i32>,
    pub dd_completed_at: Option<DateTime<Utc>>,
    pub closing_date: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    pub platform_fee: i64,
    pub integrator_fee: i64,
    pub creator_amount: i64,
    /// name -> minor-unit amount maps, stored as JSON objects.
    pub prorations: Value,
    pub adjustments: Value,
    pub net_proceeds: i64,
    /// Immutable snapshot, written exactly once when the deal closes.
    pub settlement_statement: Option<Value>,
    pub on_chain_tx_hash: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Catalog asset record
// ---------------------------------------------------------------------------

/// The downstream catalog record the reconciliation saga keeps consistent.
/// Only the saga and the drift sweep write the confirmed-identifier fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogAsset {
    pub asset_id: Uuid,
    pub organization_id: Uuid,
    pub fee_category: FeeCategory,
    pub contract_address: Option<String>,
    pub token_id: Option<String>,
    pub metadata_cid: Option<String>,
    pub updated_at: DateTime<Utc>,
}
