//! Offer creation input and its validation, including counter-offer drafts.

use chrono::{DateTime, Utc};
use ddk_schemas::{
    Contingency, DomainError, DomainResult, Offer, OfferStatus, OfferType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Longest permitted counter chain (root offer has depth 0). A chain this
/// deep means the parties are not converging; the bound also caps parent-link
/// walks everywhere else.
pub const MAX_COUNTER_DEPTH: i32 = 16;

/// Validated input for persisting a new Offer row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferDraft {
    pub asset_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount: i64,
    pub earnest_money: Option<i64>,
    pub dd_period_days: Option<i32>,
    pub closing_date: Option<DateTime<Utc>>,
    pub offer_type: OfferType,
    pub contingencies: Vec<Contingency>,
    pub terms: Value,
    pub notes: Option<String>,
    pub parent_offer_id: Option<Uuid>,
    pub counter_depth: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Field-level validation for a new offer (root or counter).
///
/// The one rule that needs store knowledge — at most one active offer per
/// (asset, buyer) — is enforced by the store layer's partial unique index and
/// pre-insert check; everything checkable from the draft alone lives here.
pub fn validate_new_offer(draft: &OfferDraft, now: DateTime<Utc>) -> DomainResult<()> {
    if draft.buyer_id == draft.seller_id {
        return Err(DomainError::validation(
            "buyer and seller must be different participants",
        ));
    }
    if draft.amount <= 0 {
        return Err(DomainError::validation("offer amount must be positive"));
    }
    if let Some(earnest) = draft.earnest_money {
        if earnest < 0 || earnest > draft.amount {
            return Err(DomainError::validation(
                "earnest money must be between 0 and the offer amount",
            ));
        }
    }
    if let Some(days) = draft.dd_period_days {
        if days <= 0 {
            return Err(DomainError::validation(
                "due diligence period must be a positive number of days",
            ));
        }
    }
    if let Some(expires_at) = draft.expires_at {
        if expires_at <= now {
            return Err(DomainError::validation(
                "expiry must be in the future",
            ));
        }
    }
    if draft.counter_depth < 0 || draft.counter_depth > MAX_COUNTER_DEPTH {
        return Err(DomainError::validation(format!(
            "counter chain depth {} exceeds the maximum of {MAX_COUNTER_DEPTH}",
            draft.counter_depth
        )));
    }
    // A root offer must not carry a parent link, and vice versa.
    match (draft.parent_offer_id, draft.counter_depth) {
        (None, 0) => Ok(()),
        (Some(_), d) if d > 0 => Ok(()),
        _ => Err(DomainError::validation(
            "counter depth and parent offer link are inconsistent",
        )),
    }
}

/// Terms the seller proposes when countering; everything structural (asset,
/// parties, parent link) is inherited from the parent offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterTerms {
    pub amount: i64,
    #[serde(default)]
    pub earnest_money: Option<i64>,
    #[serde(default)]
    pub dd_period_days: Option<i32>,
    #[serde(default)]
    pub closing_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contingencies: Option<Vec<Contingency>>,
    #[serde(default)]
    pub terms: Option<Value>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Build the PENDING child draft for a counter-offer.
///
/// The chain is forward-only by construction: the child references the
/// already-persisted parent and gets depth parent + 1, bounded by
/// [`MAX_COUNTER_DEPTH`]. The caller must have verified (under lock) that
/// the parent is still active.
pub fn counter_child_draft(
    parent: &Offer,
    terms: &CounterTerms,
    now: DateTime<Utc>,
) -> DomainResult<OfferDraft> {
    if parent.counter_depth + 1 > MAX_COUNTER_DEPTH {
        return Err(DomainError::validation(format!(
            "counter chain for offer {} already has the maximum depth of {MAX_COUNTER_DEPTH}",
            parent.id
        )));
    }

    let draft = OfferDraft {
        asset_id: parent.asset_id,
        buyer_id: parent.buyer_id,
        seller_id: parent.seller_id,
        amount: terms.amount,
        earnest_money: terms.earnest_money.or(parent.earnest_money),
        dd_period_days: terms.dd_period_days.or(parent.dd_period_days),
        closing_date: terms.closing_date.or(parent.closing_date),
        offer_type: parent.offer_type,
        contingencies: terms
            .contingencies
            .clone()
            .unwrap_or_else(|| parent.contingencies.clone()),
        terms: terms.terms.clone().unwrap_or_else(|| parent.terms.clone()),
        notes: terms.notes.clone(),
        parent_offer_id: Some(parent.id),
        counter_depth: parent.counter_depth + 1,
        expires_at: terms.expires_at,
    };
    validate_new_offer(&draft, now)?;
    Ok(draft)
}

/// New offers are persisted as PENDING; nothing else is a legal initial
/// status.
pub const INITIAL_STATUS: OfferStatus = OfferStatus::Pending;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn draft() -> OfferDraft {
        OfferDraft {
            asset_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
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

    fn parent_offer(depth: i32) -> Offer {
        let d = draft();
        let now = Utc::now();
        Offer {
            id: Uuid::new_v4(),
            asset_id: d.asset_id,
            buyer_id: d.buyer_id,
            seller_id: d.seller_id,
            amount: d.amount,
            earnest_money: d.earnest_money,
            dd_period_days: d.dd_period_days,
            closing_date: None,
            offer_type: d.offer_type,
            status: OfferStatus::Pending,
            contingencies: vec![],
            terms: json!({}),
            notes: None,
            parent_offer_id: if depth > 0 { Some(Uuid::new_v4()) } else { None },
            counter_depth: depth,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(validate_new_offer(&draft(), Utc::now()).is_ok());
    }

    #[test]
    fn self_offer_is_rejected() {
        let mut d = draft();
        d.seller_id = d.buyer_id;
        let err = validate_new_offer(&d, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        for amount in [0, -5] {
            let mut d = draft();
            d.amount = amount;
            assert!(validate_new_offer(&d, Utc::now()).is_err());
        }
    }

    #[test]
    fn earnest_above_amount_is_rejected() {
        let mut d = draft();
        d.earnest_money = Some(d.amount + 1);
        assert!(validate_new_offer(&d, Utc::now()).is_err());
    }

    #[test]
    fn past_expiry_is_rejected() {
        let mut d = draft();
        d.expires_at = Some(Utc::now() - Duration::minutes(1));
        let err = validate_new_offer(&d, Utc::now()).unwrap_err();
        assert!(err.message().contains("future"));
    }

    #[test]
    fn counter_child_inherits_parties_and_links_parent() {
        let parent = parent_offer(0);
        let child = counter_child_draft(
            &parent,
            &CounterTerms {
                amount: 95_000,
                earnest_money: None,
                dd_period_days: None,
                closing_date: None,
                contingencies: None,
                terms: None,
                notes: Some("meet in the middle".to_string()),
                expires_at: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(child.asset_id, parent.asset_id);
        assert_eq!(child.buyer_id, parent.buyer_id);
        assert_eq!(child.seller_id, parent.seller_id);
        assert_eq!(child.parent_offer_id, Some(parent.id));
        assert_eq!(child.counter_depth, 1);
        assert_eq!(child.amount, 95_000);
        // Unspecified terms fall back to the parent's.
        assert_eq!(child.earnest_money, parent.earnest_money);
    }

    #[test]
    fn counter_depth_is_bounded() {
        let parent = parent_offer(MAX_COUNTER_DEPTH);
        let err = counter_child_draft(
            &parent,
            &CounterTerms {
                amount: 90_000,
                earnest_money: None,
                dd_period_days: None,
                closing_date: None,
                contingencies: None,
                terms: None,
                notes: None,
                expires_at: None,
            },
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
        assert!(err.message().contains("depth"));
    }
}
