//! Fee / proceeds arithmetic. All amounts i64 minor units, rates i64 bps;
//! intermediate products widen to i128 so no realistic price can overflow.

use std::collections::BTreeMap;

use ddk_schemas::FeeCategory;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Platform defaults used when the per-organization fee lookup fails.
pub const DEFAULT_PLATFORM_FEE_BPS: i64 = 500;
pub const DEFAULT_INTEGRATOR_FEE_BPS: i64 = 100;

// ---------------------------------------------------------------------------
// FeeRates
// ---------------------------------------------------------------------------

/// Per-organization fee rates in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    pub platform_bps: i64,
    pub integrator_bps: i64,
}

impl FeeRates {
    pub fn platform_default() -> Self {
        FeeRates {
            platform_bps: DEFAULT_PLATFORM_FEE_BPS,
            integrator_bps: DEFAULT_INTEGRATOR_FEE_BPS,
        }
    }

    /// Resolve a fee-structure lookup outcome to usable rates.
    ///
    /// The fallback to platform defaults is explicit and logged — a failed or
    /// empty lookup must never silently substitute rates without a trace.
    pub fn resolve_lookup(
        organization_id: uuid::Uuid,
        looked_up: Result<Option<FeeRates>, anyhow::Error>,
    ) -> FeeRates {
        match looked_up {
            Ok(Some(rates)) => rates,
            Ok(None) => {
                warn!(%organization_id, "FEE_LOOKUP_FALLBACK: no fee structure for organization, using platform defaults");
                FeeRates::platform_default()
            }
            Err(e) => {
                warn!(%organization_id, error = %e, "FEE_LOOKUP_FALLBACK: fee structure lookup failed, using platform defaults");
                FeeRates::platform_default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs / output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SettlementInputs {
    pub purchase_price: i64,
    pub category: FeeCategory,
    pub rates: FeeRates,
    /// name -> minor-unit amount. BTreeMap for deterministic iteration.
    pub prorations: BTreeMap<String, i64>,
    pub adjustments: BTreeMap<String, i64>,
}

/// Full fee breakdown for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub purchase_price: i64,
    pub platform_fee: i64,
    pub integrator_fee: i64,
    /// purchase_price − platform_fee − integrator_fee, exact by construction.
    pub creator_amount: i64,
    pub total_prorations: i64,
    pub total_adjustments: i64,
    /// max(0, creator_amount − prorations − adjustments).
    pub net_proceeds: i64,
}

// ---------------------------------------------------------------------------
// compute_settlement
// ---------------------------------------------------------------------------

/// Compute the fee breakdown for a purchase.
///
/// Free-tier categories pay nothing: creator receives the full price. Paid
/// tiers split fees out of the price using the inclusive denominator
/// `10000 + platform_bps + integrator_bps`; each fee is rounded half-up
/// independently and the creator amount absorbs the remainder, so the three
/// parts always sum to the price exactly.
pub fn compute_settlement(inputs: &SettlementInputs) -> Settlement {
    let price = inputs.purchase_price.max(0);

    let (platform_fee, integrator_fee) = if inputs.category.is_free_tier() {
        (0, 0)
    } else {
        let denom = 10_000 + inputs.rates.platform_bps + inputs.rates.integrator_bps;
        (
            fee_part(price, inputs.rates.platform_bps, denom),
            fee_part(price, inputs.rates.integrator_bps, denom),
        )
    };

    let creator_amount = price - platform_fee - integrator_fee;

    let total_prorations: i64 = inputs.prorations.values().sum();
    let total_adjustments: i64 = inputs.adjustments.values().sum();
    let net_proceeds = (creator_amount - total_prorations - total_adjustments).max(0);

    Settlement {
        purchase_price: price,
        platform_fee,
        integrator_fee,
        creator_amount,
        total_prorations,
        total_adjustments,
        net_proceeds,
    }
}

/// round-half-up of price * bps / denom, in i128 to avoid overflow.
fn fee_part(price: i64, bps: i64, denom: i64) -> i64 {
    if bps == 0 || price == 0 {
        return 0;
    }
    let num = price as i128 * bps as i128;
    let d = denom as i128;
    ((2 * num + d) / (2 * d)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paid(price: i64, platform_bps: i64, integrator_bps: i64) -> Settlement {
        compute_settlement(&SettlementInputs {
            purchase_price: price,
            category: FeeCategory::Standard,
            rates: FeeRates {
                platform_bps,
                integrator_bps,
            },
            prorations: BTreeMap::new(),
            adjustments: BTreeMap::new(),
        })
    }

    #[test]
    fn free_tier_pays_zero_fees() {
        for price in [0, 1, 99, 100_000, 7_654_321] {
            let s = compute_settlement(&SettlementInputs {
                purchase_price: price,
                category: FeeCategory::Community,
                rates: FeeRates::platform_default(),
                prorations: BTreeMap::new(),
                adjustments: BTreeMap::new(),
            });
            assert_eq!(s.platform_fee, 0);
            assert_eq!(s.integrator_fee, 0);
            assert_eq!(s.creator_amount, price);
            assert_eq!(s.net_proceeds, price);
        }
    }

    #[test]
    fn reference_breakdown_500_100_bps() {
        // 100_000 at 500/100: denom 10600 -> platform 4717, integrator 943.
        let s = paid(100_000, 500, 100);
        assert_eq!(s.platform_fee + s.integrator_fee + s.creator_amount, 100_000);
        assert_eq!(s.platform_fee, 4_717);
        assert_eq!(s.integrator_fee, 943);
        assert_eq!(s.creator_amount, 94_340);
    }

    #[test]
    fn parts_always_sum_to_price_exactly() {
        let prices = [0i64, 1, 2, 3, 99, 101, 9_999, 100_000, 123_456_789];
        let rates = [0i64, 1, 50, 100, 500, 2_500, 9_999, 10_000];
        for &price in &prices {
            for &p in &rates {
                for &i in &rates {
                    let s = paid(price, p, i);
                    assert_eq!(
                        s.platform_fee + s.integrator_fee + s.creator_amount,
                        price,
                        "price={price} p={p} i={i}"
                    );
                    assert!(s.creator_amount >= 0, "price={price} p={p} i={i}");
                }
            }
        }
    }

    #[test]
    fn net_proceeds_subtracts_prorations_and_adjustments() {
        let mut prorations = BTreeMap::new();
        prorations.insert("property_tax".to_string(), 300);
        prorations.insert("hoa".to_string(), 200);
        let mut adjustments = BTreeMap::new();
        adjustments.insert("repair_credit".to_string(), 1_000);

        let s = compute_settlement(&SettlementInputs {
            purchase_price: 100_000,
            category: FeeCategory::Community,
            rates: FeeRates::platform_default(),
            prorations,
            adjustments,
        });
        assert_eq!(s.total_prorations, 500);
        assert_eq!(s.total_adjustments, 1_000);
        assert_eq!(s.net_proceeds, 100_000 - 500 - 1_000);
    }

    #[test]
    fn net_proceeds_never_negative() {
        let mut adjustments = BTreeMap::new();
        adjustments.insert("huge_credit".to_string(), i64::MAX / 4);
        let s = compute_settlement(&SettlementInputs {
            purchase_price: 1_000,
            category: FeeCategory::Standard,
            rates: FeeRates::platform_default(),
            prorations: BTreeMap::new(),
            adjustments,
        });
        assert_eq!(s.net_proceeds, 0);
    }

    #[test]
    fn lookup_fallback_uses_platform_defaults() {
        let org = uuid::Uuid::new_v4();
        let r = FeeRates::resolve_lookup(org, Ok(None));
        assert_eq!(r, FeeRates::platform_default());
        let r = FeeRates::resolve_lookup(org, Err(anyhow::anyhow!("db down")));
        assert_eq!(r, FeeRates::platform_default());
        let r = FeeRates::resolve_lookup(
            org,
            Ok(Some(FeeRates {
                platform_bps: 250,
                integrator_bps: 0,
            })),
        );
        assert_eq!(r.platform_bps, 250);
    }
}
