//! Transition table, actor checks and creation preconditions for the
//! Transaction lifecycle.

use ddk_schemas::{
    DomainError, DomainResult, Offer, OfferStatus, Transaction, TransactionStatus,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TxAction
// ---------------------------------------------------------------------------

/// Every operation that can move a Transaction to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxAction {
    /// Buyer deposits earnest money: PENDING → EARNEST_DEPOSITED.
    DepositEarnest,
    /// Buyer or seller records due diligence progress:
    /// EARNEST_DEPOSITED | DUE_DILIGENCE → DUE_DILIGENCE.
    CompleteDueDiligence,
    /// Buyer funds the purchase: DUE_DILIGENCE → FUNDING.
    Fund,
    /// Buyer or seller closes: FUNDING → CLOSED (settlement recompute +
    /// statement snapshot happen in the same database transaction).
    Close,
    /// Buyer or seller cancels any pre-FUNDING state.
    Cancel,
    /// Funding fell through: FUNDING → FAILED.
    Fail,
}

impl TxAction {
    pub fn target(&self) -> TransactionStatus {
        match self {
            TxAction::DepositEarnest => TransactionStatus::EarnestDeposited,
            TxAction::CompleteDueDiligence => TransactionStatus::DueDiligence,
            TxAction::Fund => TransactionStatus::Funding,
            TxAction::Close => TransactionStatus::Closed,
            TxAction::Cancel => TransactionStatus::Cancelled,
            TxAction::Fail => TransactionStatus::Failed,
        }
    }
}

/// The only legal forward edges. Terminal statuses return the empty slice.
pub fn allowed_targets(from: TransactionStatus) -> &'static [TransactionStatus] {
    match from {
        TransactionStatus::Pending => &[
            TransactionStatus::EarnestDeposited,
            TransactionStatus::Cancelled,
        ],
        TransactionStatus::EarnestDeposited => &[
            TransactionStatus::DueDiligence,
            TransactionStatus::Cancelled,
        ],
        TransactionStatus::DueDiligence => {
            &[TransactionStatus::Funding, TransactionStatus::Cancelled]
        }
        TransactionStatus::Funding => &[TransactionStatus::Closed, TransactionStatus::Failed],
        TransactionStatus::Closed | TransactionStatus::Cancelled | TransactionStatus::Failed => &[],
    }
}

// ---------------------------------------------------------------------------
// Creation preconditions
// ---------------------------------------------------------------------------

/// A Transaction may be created only from an ACCEPTED offer, by one of its
/// two parties. The one-transaction-per-offer rule is enforced by the store's
/// unique index on offer_id.
pub fn validate_create(offer: &Offer, actor: Uuid) -> DomainResult<()> {
    if actor != offer.buyer_id && actor != offer.seller_id {
        return Err(DomainError::authorization(
            "only the offer's buyer or seller may open a transaction",
        ));
    }
    if offer.status != OfferStatus::Accepted {
        return Err(DomainError::conflict(format!(
            "transaction requires an ACCEPTED offer; offer {} is {}",
            offer.id, offer.status
        )));
    }
    Ok(())
}

pub fn validate_earnest_amount(amount: i64, purchase_price: i64) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::validation(
            "earnest deposit must be positive",
        ));
    }
    if amount > purchase_price {
        return Err(DomainError::validation(
            "earnest deposit cannot exceed the purchase price",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// authorize_and_check
// ---------------------------------------------------------------------------

/// Validate that `actor` may apply `action` to `tx` in its current status;
/// returns the target status.
///
/// # Errors
/// - [`DomainError::Authorization`] — wrong actor for the action.
/// - [`DomainError::Conflict`] — edge not in the table; the message names
///   both the current and the attempted status.
pub fn authorize_and_check(
    tx: &Transaction,
    action: TxAction,
    actor: Uuid,
) -> DomainResult<TransactionStatus> {
    check_actor(tx, action, actor)?;

    let target = action.target();
    let legal = match action {
        // Re-recording due diligence progress while already in
        // DUE_DILIGENCE is allowed; every other action follows the table.
        TxAction::CompleteDueDiligence => matches!(
            tx.status,
            TransactionStatus::EarnestDeposited | TransactionStatus::DueDiligence
        ),
        _ => allowed_targets(tx.status).contains(&target),
    };

    if !legal {
        return Err(DomainError::invalid_transition(
            "transaction",
            tx.status.as_str(),
            target.as_str(),
        ));
    }
    Ok(target)
}

/// Explicit `update_status` entry point: accept a caller-named target only
/// when it corresponds to a legal edge and the actor may take it.
pub fn check_explicit_target(
    tx: &Transaction,
    target: TransactionStatus,
    actor: Uuid,
) -> DomainResult<TxAction> {
    let action = match target {
        TransactionStatus::EarnestDeposited => TxAction::DepositEarnest,
        TransactionStatus::DueDiligence => TxAction::CompleteDueDiligence,
        TransactionStatus::Funding => TxAction::Fund,
        TransactionStatus::Closed => TxAction::Close,
        TransactionStatus::Cancelled => TxAction::Cancel,
        TransactionStatus::Failed => TxAction::Fail,
        TransactionStatus::Pending => {
            return Err(DomainError::invalid_transition(
                "transaction",
                tx.status.as_str(),
                TransactionStatus::Pending.as_str(),
            ))
        }
    };
    authorize_and_check(tx, action, actor)?;
    Ok(action)
}

fn check_actor(tx: &Transaction, action: TxAction, actor: Uuid) -> DomainResult<()> {
    let is_buyer = actor == tx.buyer_id;
    let is_seller = actor == tx.seller_id;

    match action {
        TxAction::DepositEarnest | TxAction::Fund => {
            if is_buyer {
                Ok(())
            } else {
                Err(DomainError::authorization(format!(
                    "only the buyer may {} a transaction",
                    verb(action)
                )))
            }
        }
        TxAction::CompleteDueDiligence | TxAction::Close | TxAction::Cancel | TxAction::Fail => {
            if is_buyer || is_seller {
                Ok(())
            } else {
                Err(DomainError::authorization(format!(
                    "only the buyer or seller may {} a transaction",
                    verb(action)
                )))
            }
        }
    }
}

fn verb(action: TxAction) -> &'static str {
    match action {
        TxAction::DepositEarnest => "deposit earnest for",
        TxAction::CompleteDueDiligence => "record due diligence for",
        TxAction::Fund => "fund",
        TxAction::Close => "close",
        TxAction::Cancel => "cancel",
        TxAction::Fail => "fail",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn tx(status: TransactionStatus) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            offer_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            purchase_price: 100_000,
            earnest_amount: None,
            earnest_deposited_at: None,
            dd_period_days: Some(14),
            dd_completed_at: None,
            closing_date: None,
            status,
            platform_fee: 4_717,
            integrator_fee: 943,
            creator_amount: 94_340,
            prorations: json!({}),
            adjustments: json!({}),
            net_proceeds: 94_340,
            settlement_statement: None,
            on_chain_tx_hash: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn happy_path_edges_are_legal() {
        let t = tx(TransactionStatus::Pending);
        assert_eq!(
            authorize_and_check(&t, TxAction::DepositEarnest, t.buyer_id).unwrap(),
            TransactionStatus::EarnestDeposited
        );
        let t = tx(TransactionStatus::EarnestDeposited);
        assert_eq!(
            authorize_and_check(&t, TxAction::CompleteDueDiligence, t.seller_id).unwrap(),
            TransactionStatus::DueDiligence
        );
        let t = tx(TransactionStatus::DueDiligence);
        assert_eq!(
            authorize_and_check(&t, TxAction::Fund, t.buyer_id).unwrap(),
            TransactionStatus::Funding
        );
        let t = tx(TransactionStatus::Funding);
        assert_eq!(
            authorize_and_check(&t, TxAction::Close, t.seller_id).unwrap(),
            TransactionStatus::Closed
        );
    }

    #[test]
    fn every_edge_not_in_the_table_is_a_conflict() {
        let statuses = [
            TransactionStatus::Pending,
            TransactionStatus::EarnestDeposited,
            TransactionStatus::DueDiligence,
            TransactionStatus::Funding,
            TransactionStatus::Closed,
            TransactionStatus::Cancelled,
            TransactionStatus::Failed,
        ];
        let actions = [
            TxAction::DepositEarnest,
            TxAction::CompleteDueDiligence,
            TxAction::Fund,
            TxAction::Close,
            TxAction::Cancel,
            TxAction::Fail,
        ];
        for status in statuses {
            for action in actions {
                let t = tx(status);
                let legal = match action {
                    TxAction::CompleteDueDiligence => matches!(
                        status,
                        TransactionStatus::EarnestDeposited | TransactionStatus::DueDiligence
                    ),
                    _ => allowed_targets(status).contains(&action.target()),
                };
                let result = authorize_and_check(&t, action, t.buyer_id);
                if legal {
                    assert!(result.is_ok(), "{status} + {action:?} should be legal");
                } else {
                    let err = result.unwrap_err();
                    assert_eq!(err.kind(), "CONFLICT", "{status} + {action:?}");
                    assert!(err.message().contains(status.as_str()));
                    assert!(err.message().contains(action.target().as_str()));
                }
            }
        }
    }

    #[test]
    fn seller_cannot_deposit_or_fund() {
        let t = tx(TransactionStatus::Pending);
        let err = authorize_and_check(&t, TxAction::DepositEarnest, t.seller_id).unwrap_err();
        assert_eq!(err.kind(), "AUTHORIZATION");

        let t = tx(TransactionStatus::DueDiligence);
        let err = authorize_and_check(&t, TxAction::Fund, t.seller_id).unwrap_err();
        assert_eq!(err.kind(), "AUTHORIZATION");
    }

    #[test]
    fn stranger_cannot_touch_the_transaction() {
        let t = tx(TransactionStatus::Funding);
        let err = authorize_and_check(&t, TxAction::Close, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), "AUTHORIZATION");
    }

    #[test]
    fn explicit_target_follows_the_same_table() {
        let t = tx(TransactionStatus::Pending);
        // PENDING -> CLOSED is not an edge.
        let err = check_explicit_target(&t, TransactionStatus::Closed, t.buyer_id).unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
        assert!(err.message().contains("PENDING"));
        assert!(err.message().contains("CLOSED"));

        // PENDING -> EARNEST_DEPOSITED is, for the buyer.
        let action =
            check_explicit_target(&t, TransactionStatus::EarnestDeposited, t.buyer_id).unwrap();
        assert_eq!(action, TxAction::DepositEarnest);

        // Nothing may return to PENDING.
        let err = check_explicit_target(&t, TransactionStatus::Pending, t.buyer_id).unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[test]
    fn create_requires_accepted_offer_and_a_party() {
        let now = Utc::now();
        let offer = Offer {
            id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            amount: 100_000,
            earnest_money: None,
            dd_period_days: None,
            closing_date: None,
            offer_type: ddk_schemas::OfferType::Cash,
            status: OfferStatus::Accepted,
            contingencies: vec![],
            terms: json!({}),
            notes: None,
            parent_offer_id: None,
            counter_depth: 0,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(validate_create(&offer, offer.buyer_id).is_ok());
        assert!(validate_create(&offer, offer.seller_id).is_ok());

        let err = validate_create(&offer, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), "AUTHORIZATION");

        let mut pending = offer.clone();
        pending.status = OfferStatus::Pending;
        let err = validate_create(&pending, pending.buyer_id).unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
        assert!(err.message().contains("ACCEPTED"));
    }

    #[test]
    fn earnest_amount_bounds() {
        assert!(validate_earnest_amount(10_000, 100_000).is_ok());
        assert!(validate_earnest_amount(0, 100_000).is_err());
        assert!(validate_earnest_amount(-1, 100_000).is_err());
        assert!(validate_earnest_amount(100_001, 100_000).is_err());
    }
}
