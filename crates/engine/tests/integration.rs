//! Integration tests for the allocation engine.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p facility-engine --test integration
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use facility_common::error::AllocationError;
use facility_common::rules::{CategoryRule, FacilityConfig};
use facility_common::types::{AllocationRequest, Decision};
use facility_engine::{Calculator, CapacityLedger, Preset};

// ============================================================
// Shared helpers
// ============================================================

/// `USD` at 80% of backing, 250M sub-capacity.
fn usd_calculator() -> Calculator {
    let config = FacilityConfig {
        name: "scenarios".into(),
        version: "test".into(),
        total_capacity: None,
        default_backing_value: None,
        categories: BTreeMap::from([(
            "USD".to_string(),
            CategoryRule::ratio("US Dollar", dec!(0.80), dec!(0.80), dec!(250000000)),
        )]),
    };
    config.validate().unwrap();
    Calculator::new(Arc::new(config))
}

fn usd(amount: Decimal, backing: Decimal) -> AllocationRequest {
    AllocationRequest::new("USD", amount, Some(backing)).unwrap()
}

// ============================================================
// Scenarios
// ============================================================

#[test]
fn test_scenario_a_small_request_approved() {
    let calc = usd_calculator();
    let result = calc.evaluate(&usd(dec!(100000), dec!(150000))).unwrap();

    assert_eq!(result.ceiling, dec!(120000));
    assert_eq!(result.decision, Decision::Approved);
    assert_eq!(result.approved_amount, dec!(100000));
    assert_eq!(result.derived_value, dec!(80000));
}

#[test]
fn test_scenario_b_large_request_within_sub_capacity() {
    let calc = usd_calculator();
    let result = calc
        .evaluate(&usd(dec!(200000000), dec!(950000000)))
        .unwrap();

    assert_eq!(result.ceiling, dec!(250000000));
    assert_eq!(result.decision, Decision::Approved);
    assert_eq!(result.approved_amount, dec!(200000000));
}

#[test]
fn test_scenario_c_request_above_sub_capacity_is_partial() {
    let calc = usd_calculator();
    let result = calc
        .evaluate(&usd(dec!(300000000), dec!(950000000)))
        .unwrap();

    assert_eq!(result.decision, Decision::Partial);
    assert_eq!(result.approved_amount, dec!(250000000));
    assert_eq!(result.derived_value, dec!(200000000));
}

#[test]
fn test_scenario_d_unknown_category() {
    let calc = usd_calculator();
    let request = AllocationRequest::new("XYZ", dec!(100), Some(dec!(1000))).unwrap();
    let err = calc.evaluate(&request).unwrap_err();
    assert!(matches!(err, AllocationError::UnsupportedCategory(msg) if msg.starts_with("XYZ")));
}

#[test]
fn test_scenario_e_zero_amount() {
    let err = AllocationRequest::new("USD", Decimal::ZERO, Some(dec!(1000))).unwrap_err();
    assert!(matches!(err, AllocationError::InvalidRequest(_)));
}

// ============================================================
// Properties
// ============================================================

#[test]
fn test_decision_matches_ceiling_relation() {
    let calc = usd_calculator();
    let cases = [
        (dec!(1), dec!(10)),
        (dec!(8), dec!(10)),
        (dec!(9), dec!(10)),
        (dec!(500), dec!(0)),
        (dec!(0.01), dec!(0.01)),
        (dec!(260000000), dec!(1000000000)),
    ];

    for (amount, backing) in cases {
        let result = calc.evaluate(&usd(amount, backing)).unwrap();
        let ceiling = result.ceiling;

        if amount <= ceiling {
            assert_eq!(result.decision, Decision::Approved, "{amount}/{backing}");
            assert_eq!(result.approved_amount, amount);
        } else if ceiling > Decimal::ZERO {
            assert_eq!(result.decision, Decision::Partial, "{amount}/{backing}");
            assert_eq!(result.approved_amount, ceiling);
        } else {
            assert_eq!(result.decision, Decision::Declined, "{amount}/{backing}");
            assert_eq!(result.approved_amount, Decimal::ZERO);
        }

        assert!(result.approved_amount >= Decimal::ZERO);
        assert!(result.approved_amount <= amount);
        assert_eq!(result.derived_value, result.approved_amount * result.effective_rate);
    }
}

#[test]
fn test_evaluation_is_idempotent() {
    let calc = usd_calculator();
    let request = usd(dec!(123456.78), dec!(140000));

    let first = calc.evaluate(&request).unwrap();
    let second = calc.evaluate(&request).unwrap();

    assert!(first.is_same_outcome(&second));
    assert_ne!(first.evaluation_id, second.evaluation_id);
}

// ============================================================
// Presets
// ============================================================

#[test]
fn test_escrow_issuance_with_fee() {
    let calc = Calculator::new(Arc::new(Preset::Escrow.config()));
    let request = AllocationRequest::new("USD", dec!(100000), None).unwrap();
    let result = calc.evaluate(&request).unwrap();

    assert_eq!(result.decision, Decision::Approved);
    assert_eq!(result.derived_value, dec!(100000));
    assert_eq!(result.fee, dec!(100));
    assert_eq!(result.net_value, dec!(99900));
}

#[test]
fn test_escrow_minimum_deposit() {
    let calc = Calculator::new(Arc::new(Preset::Escrow.config()));
    let request = AllocationRequest::new("USD", dec!(50), None).unwrap();
    assert!(matches!(
        calc.evaluate(&request),
        Err(AllocationError::InvalidRequest(_))
    ));
}

#[test]
fn test_escrow_per_transaction_cap_is_in_usdt() {
    let calc = Calculator::new(Arc::new(Preset::Escrow.config()));

    let eur = calc
        .evaluate(&AllocationRequest::new("EUR", dec!(75000000), None).unwrap())
        .unwrap();
    assert_eq!(eur.decision, Decision::Partial);
    assert_eq!(eur.approved_amount, dec!(46296296.29));
    assert_eq!(eur.derived_value, dec!(49999999.9932));

    let gbp = calc
        .evaluate(&AllocationRequest::new("GBP", dec!(50000000), None).unwrap())
        .unwrap();
    assert_eq!(gbp.decision, Decision::Partial);
    assert_eq!(gbp.approved_amount, dec!(40000000));
    assert_eq!(gbp.derived_value, dec!(50000000));

    // A billion yen is about 6.7M USDT, well under the cap.
    let jpy = calc
        .evaluate(&AllocationRequest::new("JPY", dec!(1000000000), None).unwrap())
        .unwrap();
    assert_eq!(jpy.decision, Decision::Approved);
    assert_eq!(jpy.derived_value, dec!(6700000));
}

#[test]
fn test_escrow_minimum_is_usdt_equivalent() {
    let calc = Calculator::new(Arc::new(Preset::Escrow.config()));
    // 10,000 yen is 67 USDT
    let small = AllocationRequest::new("JPY", dec!(10000), None).unwrap();
    assert!(matches!(
        calc.evaluate(&small),
        Err(AllocationError::InvalidRequest(_))
    ));
    // 85 pounds is 106.25 USDT
    let enough = AllocationRequest::new("GBP", dec!(85), None).unwrap();
    assert_eq!(calc.evaluate(&enough).unwrap().decision, Decision::Approved);
}

#[test]
fn test_escrow_redemption_fee() {
    let ledger = CapacityLedger::new(Calculator::new(Arc::new(Preset::Escrow.config())));
    ledger
        .allocate(&AllocationRequest::new("USD", dec!(100000), None).unwrap())
        .unwrap();

    let release = ledger.release("USD", dec!(20000)).unwrap();
    assert_eq!(release.released, dec!(20000));
    assert_eq!(release.fee, dec!(20));
    assert_eq!(release.net_released, dec!(19980));

    assert!(matches!(
        ledger.release("USD", dec!(49)),
        Err(AllocationError::InvalidRequest(_))
    ));
    assert_eq!(ledger.total_drawn(), dec!(80000));
}

#[test]
fn test_bond_uses_default_portfolio_backing() {
    let calc = Calculator::new(Arc::new(Preset::Bond.config()));
    let request = AllocationRequest::new("market", dec!(100000000), None).unwrap();
    let result = calc.evaluate(&request).unwrap();

    assert_eq!(result.backing_value, Some(dec!(950000000)));
    assert_eq!(result.ceiling, dec!(760000000));
    assert_eq!(result.decision, Decision::Approved);
    assert_eq!(result.derived_value, dec!(5750000));
}

#[test]
fn test_business_line_partial() {
    let calc = Calculator::new(Arc::new(Preset::Business.config()));
    let request = AllocationRequest::new("consulting_services", dec!(30000000), None).unwrap();
    let result = calc.evaluate(&request).unwrap();

    // 3% of 760M
    assert_eq!(result.ceiling, dec!(22800000));
    assert_eq!(result.decision, Decision::Partial);
}

// ============================================================
// Ledger
// ============================================================

#[test]
fn test_credit_ledger_draws_against_sub_capacity() {
    let ledger = CapacityLedger::new(Calculator::new(Arc::new(Preset::Credit.config())));

    let first = ledger.allocate(&usd(dec!(200000000), dec!(950000000))).unwrap();
    assert_eq!(first.decision, Decision::Approved);

    let second = ledger.allocate(&usd(dec!(200000000), dec!(950000000))).unwrap();
    assert_eq!(second.decision, Decision::Partial);
    assert_eq!(second.approved_amount, dec!(50000000));

    let third = ledger.allocate(&usd(dec!(1), dec!(950000000))).unwrap();
    assert_eq!(third.decision, Decision::Declined);

    let snapshot = ledger.snapshot();
    assert_eq!(snapshot.total_drawn, dec!(250000000));
    assert_eq!(snapshot.total_remaining, Some(dec!(510000000)));
}

#[test]
fn test_concurrent_allocations_never_over_allocate() {
    let ledger = Arc::new(CapacityLedger::new(usd_calculator()));
    let threads = 16;
    let per_thread = 50;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let mut approved = Decimal::ZERO;
                for _ in 0..per_thread {
                    let result = ledger
                        .allocate(&usd(dec!(1000000), dec!(10000000000)))
                        .unwrap();
                    approved += result.approved_amount;
                }
                approved
            })
        })
        .collect();

    let approved: Decimal = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // 800 requests of 1M against 250M of capacity
    assert_eq!(approved, dec!(250000000));
    assert_eq!(ledger.total_drawn(), dec!(250000000));
    assert_eq!(ledger.remaining("USD").unwrap().category, Decimal::ZERO);
}
