//! Request / response DTOs for the HTTP surface. Statuses and enums travel
//! as SCREAMING_SNAKE strings; money as i64 minor units.

use chrono::{DateTime, Utc};
use ddk_schemas::{Contingency, OfferType, TransactionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

/// Body of POST /v1/offers. The buyer is the `X-Actor-Id` caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOfferRequest {
    pub asset_id: Uuid,
    pub seller_id: Uuid,
    pub amount: i64,
    #[serde(default)]
    pub earnest_money: Option<i64>,
    #[serde(default)]
    pub dd_period_days: Option<i32>,
    #[serde(default)]
    pub closing_date: Option<DateTime<Utc>>,
    pub offer_type: OfferType,
    #[serde(default)]
    pub contingencies: Vec<Contingency>,
    #[serde(default)]
    pub terms: Option<Value>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeclineOfferRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransactionRequest {
    pub offer_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositEarnestRequest {
    pub amount: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelTransactionRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of POST /v1/transactions/:id/status — the explicit target form.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TransactionStatus,
    #[serde(default)]
    pub earnest_amount: Option<i64>,
}

// ---------------------------------------------------------------------------
// Health / status / ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub db_ok: bool,
    pub has_schema: bool,
    pub daemon_uptime_secs: u64,
    pub config_hash: String,
    pub version: String,
}

/// Ack body for the two event-ingest endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub event_id: String,
    /// APPLIED | SKIPPED_DUPLICATE | BENIGN_SKIP | DEAD_LETTERED
    pub outcome: String,
}
