//! Capacity ledger: running totals of drawn capacity per category.
//!
//! Each allocation reads the remaining capacity, evaluates the request and
//! records the approved amount under one lock, so concurrent callers can never
//! both be approved against capacity that only covers one of them.
//!
//! State is in-memory only and resets with the process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use facility_common::error::AllocationError;
use facility_common::types::{AllocationRequest, AllocationResult, Decision};

use crate::calculator::{Calculator, Remaining};

#[derive(Debug, Default)]
struct LedgerState {
    drawn: HashMap<String, Decimal>,
    total_drawn: Decimal,
}

/// Utilization of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryUtilization {
    pub category: String,
    pub label: String,
    pub sub_capacity: Decimal,
    pub drawn: Decimal,
    pub remaining: Decimal,
    /// `drawn / sub_capacity`, four decimal places.
    pub utilization: Decimal,
}

/// Point-in-time view of the ledger, suitable for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub total_capacity: Option<Decimal>,
    pub total_drawn: Decimal,
    pub total_remaining: Option<Decimal>,
    pub categories: Vec<CategoryUtilization>,
}

/// Outcome of returning capacity to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub category: String,
    pub requested: Decimal,
    /// Capacity actually returned, capped at what was drawn.
    pub released: Decimal,
    pub fee: Decimal,
    pub net_released: Decimal,
}

/// Thread-safe running-total accumulator.
pub struct CapacityLedger {
    calculator: Calculator,
    state: Mutex<LedgerState>,
}

impl CapacityLedger {
    pub fn new(calculator: Calculator) -> Self {
        Self {
            calculator,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    /// Evaluate a request against remaining capacity and record it unless declined.
    pub fn allocate(&self, request: &AllocationRequest) -> Result<AllocationResult, AllocationError> {
        let mut state = self.lock();
        let remaining = self.remaining_in(&state, request.category())?;
        let result = self.calculator.evaluate_against(request, remaining)?;

        if result.decision != Decision::Declined {
            let total_drawn = state
                .total_drawn
                .checked_add(result.approved_amount)
                .ok_or_else(|| {
                    AllocationError::InvalidRequest(format!(
                        "total drawn would exceed the representable range after {} {}",
                        result.approved_amount, result.category
                    ))
                })?;
            *state
                .drawn
                .entry(result.category.clone())
                .or_insert(Decimal::ZERO) += result.approved_amount;
            state.total_drawn = total_drawn;

            tracing::info!(
                category = %result.category,
                decision = %result.decision,
                approved = %result.approved_amount,
                total_drawn = %state.total_drawn,
                "Allocation recorded"
            );
        } else {
            tracing::info!(
                category = %result.category,
                requested = %result.requested_amount,
                "Allocation declined, capacity exhausted"
            );
        }

        Ok(result)
    }

    /// Return previously drawn capacity (repayment or redemption).
    ///
    /// Releases at most what is currently drawn. When the category carries a
    /// redemption fee, the fee is charged on the released amount and the
    /// returned `net_released` is what the holder receives.
    pub fn release(&self, category: &str, amount: Decimal) -> Result<Release, AllocationError> {
        if amount <= Decimal::ZERO {
            return Err(AllocationError::InvalidRequest(format!(
                "release amount must be greater than zero (got {amount})"
            )));
        }
        let rule = self.calculator.rule(category)?;
        if let Some(min) = rule.min_release
            && amount < min
        {
            return Err(AllocationError::InvalidRequest(format!(
                "release amount {amount} is below the {category} minimum of {min}"
            )));
        }

        let mut state = self.lock();
        let drawn = state.drawn.get(category).copied().unwrap_or(Decimal::ZERO);
        let released = amount.min(drawn);
        if released > Decimal::ZERO {
            state.drawn.insert(category.to_string(), drawn - released);
            state.total_drawn -= released;
        }

        let fee = match rule.redemption_fee_rate {
            Some(rate) => {
                let fee = released * rate;
                match rule.precision {
                    Some(dp) => fee.round_dp(dp),
                    None => fee,
                }
            }
            None => Decimal::ZERO,
        };

        tracing::info!(
            category,
            requested = %amount,
            released = %released,
            fee = %fee,
            "Capacity released"
        );

        Ok(Release {
            category: category.to_string(),
            requested: amount,
            released,
            fee,
            net_released: released - fee,
        })
    }

    /// Remaining capacity for a category.
    pub fn remaining(&self, category: &str) -> Result<Remaining, AllocationError> {
        let state = self.lock();
        self.remaining_in(&state, category)
    }

    pub fn total_drawn(&self) -> Decimal {
        self.lock().total_drawn
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.lock();
        let config = self.calculator.config();

        let categories = config
            .categories
            .iter()
            .map(|(category, rule)| {
                let drawn = state.drawn.get(category).copied().unwrap_or(Decimal::ZERO);
                let utilization = if rule.sub_capacity > Decimal::ZERO {
                    (drawn / rule.sub_capacity).round_dp(4)
                } else {
                    Decimal::ZERO
                };
                CategoryUtilization {
                    category: category.clone(),
                    label: rule.label.clone(),
                    sub_capacity: rule.sub_capacity,
                    drawn,
                    remaining: (rule.sub_capacity - drawn).max(Decimal::ZERO),
                    utilization,
                }
            })
            .collect();

        LedgerSnapshot {
            total_capacity: config.total_capacity,
            total_drawn: state.total_drawn,
            total_remaining: config
                .total_capacity
                .map(|total| (total - state.total_drawn).max(Decimal::ZERO)),
            categories,
        }
    }

    /// Clear all running totals.
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = LedgerState::default();
        tracing::debug!("Ledger reset");
    }

    fn remaining_in(&self, state: &LedgerState, category: &str) -> Result<Remaining, AllocationError> {
        let full = self.calculator.full_capacity(category)?;
        let drawn = state.drawn.get(category).copied().unwrap_or(Decimal::ZERO);
        Ok(Remaining {
            category: (full.category - drawn).max(Decimal::ZERO),
            total: full
                .total
                .map(|total| (total - state.total_drawn).max(Decimal::ZERO)),
        })
    }

    // Every mutation completes before the guard drops, so a poisoned lock
    // still holds consistent totals.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_common::rules::{CategoryRule, FacilityConfig};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn ledger(total: Option<Decimal>) -> CapacityLedger {
        let config = FacilityConfig {
            name: "ledger".into(),
            version: "v1".into(),
            total_capacity: total,
            default_backing_value: None,
            categories: BTreeMap::from([
                ("A".to_string(), CategoryRule::flat("Line A", dec!(0.10), dec!(1000))),
                ("B".to_string(), CategoryRule::flat("Line B", dec!(0.20), dec!(500))),
            ]),
        };
        CapacityLedger::new(Calculator::new(Arc::new(config)))
    }

    fn req(category: &str, amount: Decimal) -> AllocationRequest {
        AllocationRequest::new(category, amount, None).unwrap()
    }

    #[test]
    fn test_allocations_draw_down_capacity() {
        let ledger = ledger(None);

        let first = ledger.allocate(&req("A", dec!(600))).unwrap();
        assert_eq!(first.decision, Decision::Approved);

        let second = ledger.allocate(&req("A", dec!(600))).unwrap();
        assert_eq!(second.decision, Decision::Partial);
        assert_eq!(second.approved_amount, dec!(400));

        let third = ledger.allocate(&req("A", dec!(1))).unwrap();
        assert_eq!(third.decision, Decision::Declined);

        assert_eq!(ledger.remaining("A").unwrap().category, Decimal::ZERO);
        assert_eq!(ledger.total_drawn(), dec!(1000));
    }

    #[test]
    fn test_declined_leaves_ledger_unchanged() {
        let ledger = ledger(None);
        ledger.allocate(&req("B", dec!(500))).unwrap();
        let before = ledger.snapshot();
        let declined = ledger.allocate(&req("B", dec!(10))).unwrap();
        assert_eq!(declined.decision, Decision::Declined);
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn test_total_capacity_shared_across_categories() {
        let ledger = ledger(Some(dec!(800)));
        ledger.allocate(&req("A", dec!(700))).unwrap();
        let result = ledger.allocate(&req("B", dec!(300))).unwrap();
        assert_eq!(result.decision, Decision::Partial);
        assert_eq!(result.approved_amount, dec!(100));
        assert_eq!(ledger.snapshot().total_remaining, Some(Decimal::ZERO));
    }

    #[test]
    fn test_release_restores_capacity() {
        let ledger = ledger(None);
        ledger.allocate(&req("A", dec!(1000))).unwrap();
        assert_eq!(ledger.release("A", dec!(250)).unwrap().released, dec!(250));
        assert_eq!(ledger.remaining("A").unwrap().category, dec!(250));

        let result = ledger.allocate(&req("A", dec!(250))).unwrap();
        assert_eq!(result.decision, Decision::Approved);
    }

    #[test]
    fn test_release_is_capped_at_drawn() {
        let ledger = ledger(None);
        ledger.allocate(&req("B", dec!(100))).unwrap();
        let release = ledger.release("B", dec!(400)).unwrap();
        assert_eq!(release.requested, dec!(400));
        assert_eq!(release.released, dec!(100));
        assert_eq!(release.net_released, dec!(100));
        assert_eq!(ledger.total_drawn(), Decimal::ZERO);
    }

    #[test]
    fn test_release_validation() {
        let ledger = ledger(None);
        assert!(matches!(
            ledger.release("A", Decimal::ZERO),
            Err(AllocationError::InvalidRequest(_))
        ));
        assert!(matches!(
            ledger.release("Z", dec!(1)),
            Err(AllocationError::UnsupportedCategory(_))
        ));
    }

    #[test]
    fn test_unknown_category_does_not_touch_state() {
        let ledger = ledger(None);
        assert!(ledger.allocate(&req("Z", dec!(1))).is_err());
        assert_eq!(ledger.total_drawn(), Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_utilization() {
        let ledger = ledger(None);
        ledger.allocate(&req("B", dec!(125))).unwrap();
        let snapshot = ledger.snapshot();
        let b = snapshot
            .categories
            .iter()
            .find(|c| c.category == "B")
            .unwrap();
        assert_eq!(b.drawn, dec!(125));
        assert_eq!(b.remaining, dec!(375));
        assert_eq!(b.utilization, dec!(0.25));
        assert_eq!(snapshot.total_capacity, None);
        assert_eq!(snapshot.total_remaining, None);
    }

    #[test]
    fn test_reset() {
        let ledger = ledger(None);
        ledger.allocate(&req("A", dec!(10))).unwrap();
        ledger.reset();
        assert_eq!(ledger.total_drawn(), Decimal::ZERO);
        assert_eq!(ledger.remaining("A").unwrap().category, dec!(1000));
    }

    #[test]
    fn test_release_charges_redemption_fee() {
        let rule = CategoryRule::flat("Pound", dec!(1.25), dec!(10000))
            .with_redemption(dec!(0.001), Some(dec!(40)))
            .with_precision(2);
        let ledger = CapacityLedger::new(Calculator::new(Arc::new(FacilityConfig {
            name: "redeem".into(),
            version: "v1".into(),
            total_capacity: None,
            default_backing_value: None,
            categories: BTreeMap::from([("GBP".to_string(), rule)]),
        })));
        ledger.allocate(&req("GBP", dec!(5000))).unwrap();

        let release = ledger.release("GBP", dec!(1234)).unwrap();
        assert_eq!(release.released, dec!(1234));
        // 1234 * 0.001 = 1.234 → 1.23
        assert_eq!(release.fee, dec!(1.23));
        assert_eq!(release.net_released, dec!(1232.77));
        assert_eq!(ledger.remaining("GBP").unwrap().category, dec!(6234));

        let below_minimum = ledger.release("GBP", dec!(39.99));
        assert!(matches!(
            below_minimum,
            Err(AllocationError::InvalidRequest(msg)) if msg.contains("minimum")
        ));
        assert_eq!(ledger.total_drawn(), dec!(3766));
    }

    #[test]
    fn test_total_drawn_overflow_leaves_state_untouched() {
        let ledger = CapacityLedger::new(Calculator::new(Arc::new(FacilityConfig {
            name: "huge".into(),
            version: "v1".into(),
            total_capacity: None,
            default_backing_value: None,
            categories: BTreeMap::from([
                ("A".to_string(), CategoryRule::flat("A", Decimal::ZERO, Decimal::MAX)),
                ("B".to_string(), CategoryRule::flat("B", Decimal::ZERO, Decimal::MAX)),
            ]),
        })));
        let big = dec!(70000000000000000000000000000);
        ledger.allocate(&req("A", big)).unwrap();

        let err = ledger.allocate(&req("B", big)).unwrap_err();
        assert!(matches!(err, AllocationError::InvalidRequest(_)));
        assert_eq!(ledger.total_drawn(), big);
        assert_eq!(ledger.remaining("B").unwrap().category, Decimal::MAX);
    }
}
