//! Transition table and actor checks for the Offer lifecycle.

use chrono::{DateTime, Utc};
use ddk_schemas::{DomainError, DomainResult, Offer, OfferStatus};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OfferAction
// ---------------------------------------------------------------------------

/// Every operation that can move an Offer to a new status.
///
/// `Expire` carries no actor: it is applied by the expiry sweep, not by a
/// participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferAction {
    /// Seller starts reviewing: PENDING → UNDER_REVIEW.
    Review,
    /// Seller accepts: active → ACCEPTED (siblings are declined in the same
    /// database transaction by the store layer).
    Accept,
    /// Seller declines: active → DECLINED.
    Decline,
    /// Buyer withdraws: active → WITHDRAWN.
    Withdraw,
    /// Seller counters: active → COUNTERED; a new PENDING child is created.
    Counter,
    /// Expiry sweep: active + past expires_at → EXPIRED.
    Expire,
}

impl OfferAction {
    pub fn target(&self) -> OfferStatus {
        match self {
            OfferAction::Review => OfferStatus::UnderReview,
            OfferAction::Accept => OfferStatus::Accepted,
            OfferAction::Decline => OfferStatus::Declined,
            OfferAction::Withdraw => OfferStatus::Withdrawn,
            OfferAction::Counter => OfferStatus::Countered,
            OfferAction::Expire => OfferStatus::Expired,
        }
    }
}

/// Legal target statuses from a given status. Terminal statuses return the
/// empty slice.
pub fn allowed_targets(from: OfferStatus) -> &'static [OfferStatus] {
    match from {
        OfferStatus::Pending => &[
            OfferStatus::UnderReview,
            OfferStatus::Accepted,
            OfferStatus::Declined,
            OfferStatus::Withdrawn,
            OfferStatus::Countered,
            OfferStatus::Expired,
        ],
        // Same outgoing set as PENDING minus re-entering review.
        OfferStatus::UnderReview => &[
            OfferStatus::Accepted,
            OfferStatus::Declined,
            OfferStatus::Withdrawn,
            OfferStatus::Countered,
            OfferStatus::Expired,
        ],
        OfferStatus::Accepted
        | OfferStatus::Declined
        | OfferStatus::Withdrawn
        | OfferStatus::Countered
        | OfferStatus::Expired => &[],
    }
}

// ---------------------------------------------------------------------------
// authorize_and_check
// ---------------------------------------------------------------------------

/// Validate that `actor` may apply `action` to `offer` right now.
///
/// Returns the target status on success. Checks run in a fixed order:
/// actor authorization first, then the transition table, then expiry. The
/// caller must perform the corresponding mutation inside a transaction that
/// locked the offer row before re-running this check on the fresh row.
///
/// # Errors
/// - [`DomainError::Authorization`] — wrong actor for the action.
/// - [`DomainError::Conflict`] — transition not in the table (message names
///   both current and attempted status), or the offer has expired.
pub fn authorize_and_check(
    offer: &Offer,
    action: OfferAction,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
) -> DomainResult<OfferStatus> {
    check_actor(offer, action, actor)?;

    let target = action.target();
    if !allowed_targets(offer.status).contains(&target) {
        return Err(DomainError::invalid_transition(
            "offer",
            offer.status.as_str(),
            target.as_str(),
        ));
    }

    // Accepting a stale offer is a conflict even while the sweep has not yet
    // flipped it to EXPIRED.
    if action == OfferAction::Accept && offer.is_expired_at(now) {
        return Err(DomainError::conflict(format!(
            "offer {} has expired and can no longer be accepted",
            offer.id
        )));
    }

    Ok(target)
}

fn check_actor(offer: &Offer, action: OfferAction, actor: Option<Uuid>) -> DomainResult<()> {
    let require = |expected: Uuid, role: &str| -> DomainResult<()> {
        match actor {
            Some(a) if a == expected => Ok(()),
            Some(_) => Err(DomainError::authorization(format!(
                "only the {role} may {} this offer",
                verb(action)
            ))),
            None => Err(DomainError::authorization(format!(
                "an actor is required to {} an offer",
                verb(action)
            ))),
        }
    };

    match action {
        OfferAction::Review | OfferAction::Accept | OfferAction::Decline | OfferAction::Counter => {
            require(offer.seller_id, "seller")
        }
        OfferAction::Withdraw => require(offer.buyer_id, "buyer"),
        // System action; any caller (the sweep) may apply it.
        OfferAction::Expire => Ok(()),
    }
}

fn verb(action: OfferAction) -> &'static str {
    match action {
        OfferAction::Review => "review",
        OfferAction::Accept => "accept",
        OfferAction::Decline => "decline",
        OfferAction::Withdraw => "withdraw",
        OfferAction::Counter => "counter",
        OfferAction::Expire => "expire",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn offer(status: OfferStatus) -> Offer {
        let now = Utc::now();
        Offer {
            id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            amount: 100_000,
            earnest_money: Some(10_000),
            dd_period_days: Some(14),
            closing_date: None,
            offer_type: ddk_schemas::OfferType::Cash,
            status,
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

    #[test]
    fn seller_can_accept_pending_and_under_review() {
        for status in [OfferStatus::Pending, OfferStatus::UnderReview] {
            let o = offer(status);
            let target =
                authorize_and_check(&o, OfferAction::Accept, Some(o.seller_id), Utc::now())
                    .unwrap();
            assert_eq!(target, OfferStatus::Accepted);
        }
    }

    #[test]
    fn buyer_cannot_accept() {
        let o = offer(OfferStatus::Pending);
        let err = authorize_and_check(&o, OfferAction::Accept, Some(o.buyer_id), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), "AUTHORIZATION");
    }

    #[test]
    fn seller_cannot_withdraw() {
        let o = offer(OfferStatus::Pending);
        let err = authorize_and_check(&o, OfferAction::Withdraw, Some(o.seller_id), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), "AUTHORIZATION");
    }

    #[test]
    fn every_transition_out_of_a_terminal_status_is_a_conflict() {
        let terminal = [
            OfferStatus::Accepted,
            OfferStatus::Declined,
            OfferStatus::Withdrawn,
            OfferStatus::Countered,
            OfferStatus::Expired,
        ];
        let actions = [
            OfferAction::Review,
            OfferAction::Accept,
            OfferAction::Decline,
            OfferAction::Withdraw,
            OfferAction::Counter,
            OfferAction::Expire,
        ];
        for status in terminal {
            for action in actions {
                let o = offer(status);
                let actor = match action {
                    OfferAction::Withdraw => Some(o.buyer_id),
                    OfferAction::Expire => None,
                    _ => Some(o.seller_id),
                };
                let err = authorize_and_check(&o, action, actor, Utc::now()).unwrap_err();
                assert_eq!(err.kind(), "CONFLICT", "{status} + {action:?}");
                // The message must name both states.
                assert!(err.message().contains(status.as_str()), "{status} {action:?}");
                assert!(
                    err.message().contains(action.target().as_str()),
                    "{status} {action:?}"
                );
            }
        }
    }

    #[test]
    fn review_only_from_pending() {
        let o = offer(OfferStatus::UnderReview);
        let err = authorize_and_check(&o, OfferAction::Review, Some(o.seller_id), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[test]
    fn expired_offer_cannot_be_accepted() {
        let mut o = offer(OfferStatus::Pending);
        o.expires_at = Some(Utc::now() - Duration::hours(1));
        let err = authorize_and_check(&o, OfferAction::Accept, Some(o.seller_id), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
        assert!(err.message().contains("expired"));
    }

    #[test]
    fn expire_applies_to_active_offers_without_an_actor() {
        let o = offer(OfferStatus::UnderReview);
        let target = authorize_and_check(&o, OfferAction::Expire, None, Utc::now()).unwrap();
        assert_eq!(target, OfferStatus::Expired);
    }
}
