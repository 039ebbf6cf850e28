//! ddk-settlement
//!
//! Deterministic settlement / revenue calculator.
//!
//! Architectural decisions:
//! - Pure logic. No IO. No clock reads inside the calculator.
//! - Fees are computed against an inclusive denominator
//!   (10000 + platform_bps + integrator_bps) so the purchase price already
//!   contains both fees.
//! - `creator_amount` is derived by subtraction, never rounded on its own,
//!   so platform + integrator + creator always reconciles exactly with the
//!   purchase price.
//! - The free tier (`FeeCategory::Community`) pays zero fees.

mod calculator;
mod statement;

pub use calculator::{
    compute_settlement, FeeRates, Settlement, SettlementInputs, DEFAULT_INTEGRATOR_FEE_BPS,
    DEFAULT_PLATFORM_FEE_BPS,
};
pub use statement::{build_statement, StatementContext};
