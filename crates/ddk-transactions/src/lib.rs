//! ddk-transactions
//!
//! Transaction lifecycle state machine.
//!
//! # Design
//!
//! Pure logic, same shape as the offer machine: the store layer re-runs
//! [`authorize_and_check`] on the freshly locked row inside its transaction,
//! so no interleaving can push a Transaction through an edge that is not in
//! the table, and rejections mutate nothing.
//!
//! # State diagram
//!
//! ```text
//!   create ─► PENDING ─► EARNEST_DEPOSITED ─► DUE_DILIGENCE ─► FUNDING ─► CLOSED
//!                │               │                  │             │
//!                └───────────────┴──► CANCELLED ◄───┘             └─► FAILED
//! ```
//!
//! CLOSED, CANCELLED and FAILED are terminal. `close` recomputes settlement
//! and writes the immutable statement snapshot in the same database
//! transaction that flips the status.

mod state_machine;

pub use state_machine::{
    allowed_targets, authorize_and_check, check_explicit_target, validate_create,
    validate_earnest_amount, TxAction,
};
