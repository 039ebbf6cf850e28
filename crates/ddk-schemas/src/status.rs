//! Status enums for the two lifecycle state machines, plus the fee category.
//!
//! Statuses travel over the wire as SCREAMING_SNAKE strings and are stored in
//! Postgres as text; `as_str` / `parse` are the single conversion points.

use serde::{Deserialize, Serialize};

use crate::DomainError;

// ---------------------------------------------------------------------------
// OfferStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Pending,
    UnderReview,
    Accepted,
    Declined,
    Withdrawn,
    Countered,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "PENDING",
            OfferStatus::UnderReview => "UNDER_REVIEW",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Declined => "DECLINED",
            OfferStatus::Withdrawn => "WITHDRAWN",
            OfferStatus::Countered => "COUNTERED",
            OfferStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "PENDING" => Ok(OfferStatus::Pending),
            "UNDER_REVIEW" => Ok(OfferStatus::UnderReview),
            "ACCEPTED" => Ok(OfferStatus::Accepted),
            "DECLINED" => Ok(OfferStatus::Declined),
            "WITHDRAWN" => Ok(OfferStatus::Withdrawn),
            "COUNTERED" => Ok(OfferStatus::Countered),
            "EXPIRED" => Ok(OfferStatus::Expired),
            other => Err(DomainError::validation(format!(
                "invalid offer status: {other}"
            ))),
        }
    }

    /// Active = still negotiable. Exactly PENDING and UNDER_REVIEW.
    pub fn is_active(&self) -> bool {
        matches!(self, OfferStatus::Pending | OfferStatus::UnderReview)
    }

    /// Terminal for this offer node. COUNTERED is terminal here even though
    /// it spawns a new PENDING child offer.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TransactionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    EarnestDeposited,
    DueDiligence,
    Funding,
    Closed,
    Cancelled,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::EarnestDeposited => "EARNEST_DEPOSITED",
            TransactionStatus::DueDiligence => "DUE_DILIGENCE",
            TransactionStatus::Funding => "FUNDING",
            TransactionStatus::Closed => "CLOSED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "EARNEST_DEPOSITED" => Ok(TransactionStatus::EarnestDeposited),
            "DUE_DILIGENCE" => Ok(TransactionStatus::DueDiligence),
            "FUNDING" => Ok(TransactionStatus::Funding),
            "CLOSED" => Ok(TransactionStatus::Closed),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(DomainError::validation(format!(
                "invalid transaction status: {other}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Closed | TransactionStatus::Cancelled | TransactionStatus::Failed
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FeeCategory
// ---------------------------------------------------------------------------

/// Asset classification driving fee treatment. `Community` is the free tier:
/// zero fees, creator receives the full price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeCategory {
    Standard,
    Curated,
    Community,
}

impl FeeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeCategory::Standard => "STANDARD",
            FeeCategory::Curated => "CURATED",
            FeeCategory::Community => "COMMUNITY",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "STANDARD" => Ok(FeeCategory::Standard),
            "CURATED" => Ok(FeeCategory::Curated),
            "COMMUNITY" => Ok(FeeCategory::Community),
            other => Err(DomainError::validation(format!(
                "invalid fee category: {other}"
            ))),
        }
    }

    pub fn is_free_tier(&self) -> bool {
        matches!(self, FeeCategory::Community)
    }
}
