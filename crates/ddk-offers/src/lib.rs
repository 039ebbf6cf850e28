//! ddk-offers
//!
//! Offer lifecycle state machine.
//!
//! # Design
//!
//! Pure logic. No IO, no clock reads — `now` is always a parameter. The
//! database layer calls [`authorize_and_check`] inside its row-locked
//! transactions, so every persisted transition has passed exactly this
//! table, and a precondition violation performs zero mutation.
//!
//! # State diagram
//!
//! ```text
//!              Review
//!   create ─► PENDING ────────► UNDER_REVIEW
//!                │ \                 │
//!                │  └────┬───────────┤
//!                ▼       ▼           ▼
//!            ACCEPTED DECLINED  WITHDRAWN | COUNTERED | EXPIRED   (all terminal)
//!                                              │
//!                                              └─► spawns new PENDING child
//! ```
//!
//! COUNTERED is terminal for the parent node; the counter operation creates a
//! fresh PENDING offer linked via `parent_offer_id`, depth-bounded and
//! forward-only so chains can never cycle.

mod draft;
mod state_machine;

pub use draft::{
    counter_child_draft, validate_new_offer, CounterTerms, OfferDraft, INITIAL_STATUS,
    MAX_COUNTER_DEPTH,
};
pub use state_machine::{allowed_targets, authorize_and_check, OfferAction};
