//! Built-in rule tables.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use facility_common::error::AppError;
use facility_common::rules::{CategoryRule, FacilityConfig};

/// Capacity unlocked by the portfolio at 80% LTV.
const PORTFOLIO_CREDIT_CAPACITY: Decimal = dec!(760000000);

/// Declared portfolio value backing bond issuance.
const PORTFOLIO_VALUE: Decimal = dec!(950000000);

const MAX_LTV: Decimal = dec!(0.80);

// Escrow limits are quoted in USDT and converted per currency.
const MIN_ISSUANCE_USDT: Decimal = dec!(100);
const MAX_ISSUANCE_USDT: Decimal = dec!(50000000);
const MIN_REDEMPTION_USDT: Decimal = dec!(50);
const ISSUANCE_FEE: Decimal = dec!(0.001);
const REDEMPTION_FEE: Decimal = dec!(0.001);

/// Named rule tables shipped with the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Fiat escrow deposits converted to USDT.
    Escrow,
    /// Collateralised credit line.
    Credit,
    /// Bond issuance against the portfolio.
    Bond,
    /// Business-line capital allocation.
    Business,
}

impl Preset {
    pub fn all() -> [Preset; 4] {
        [Preset::Escrow, Preset::Credit, Preset::Bond, Preset::Business]
    }

    pub fn config(&self) -> FacilityConfig {
        match self {
            Preset::Escrow => escrow(),
            Preset::Credit => credit(),
            Preset::Bond => bond(),
            Preset::Business => business(),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::Escrow => write!(f, "escrow"),
            Preset::Credit => write!(f, "credit"),
            Preset::Bond => write!(f, "bond"),
            Preset::Business => write!(f, "business"),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "escrow" => Ok(Preset::Escrow),
            "credit" => Ok(Preset::Credit),
            "bond" => Ok(Preset::Bond),
            "business" => Ok(Preset::Business),
            other => Err(AppError::Config(format!(
                "unknown preset `{other}` (expected one of: escrow, credit, bond, business)"
            ))),
        }
    }
}

fn escrow() -> FacilityConfig {
    // (code, name, capacity in local units, USDT per unit)
    let currencies = [
        ("USD", "US Dollar", dec!(250000000), dec!(1.00)),
        ("EUR", "Euro", dec!(200000000), dec!(1.08)),
        ("GBP", "British Pound", dec!(150000000), dec!(1.25)),
        ("CAD", "Canadian Dollar", dec!(200000000), dec!(0.74)),
        ("AUD", "Australian Dollar", dec!(200000000), dec!(0.66)),
        ("JPY", "Japanese Yen", dec!(25000000000), dec!(0.0067)),
    ];

    let categories = currencies
        .into_iter()
        .map(|(code, name, capacity, rate)| {
            let rule = CategoryRule::flat(name, rate, capacity)
                .with_fee_rate(ISSUANCE_FEE)
                .with_request_limits(
                    Some(local_limit(MIN_ISSUANCE_USDT, rate, RoundingStrategy::AwayFromZero)),
                    Some(local_limit(MAX_ISSUANCE_USDT, rate, RoundingStrategy::ToZero)),
                )
                .with_redemption(
                    REDEMPTION_FEE,
                    Some(local_limit(MIN_REDEMPTION_USDT, rate, RoundingStrategy::AwayFromZero)),
                )
                .with_precision(6);
            (code.to_string(), rule)
        })
        .collect();

    FacilityConfig {
        name: "Escrow & USDT Issuance".to_string(),
        version: "v2.0".to_string(),
        // Capacities are in local currency units and do not share a pool.
        total_capacity: None,
        default_backing_value: None,
        categories,
    }
}

/// USDT amount → local currency units at two decimals. Minimums round up and
/// maximums round down so the USDT bound always holds.
fn local_limit(usdt: Decimal, rate: Decimal, strategy: RoundingStrategy) -> Decimal {
    (usdt / rate).round_dp_with_strategy(2, strategy).normalize()
}

fn credit() -> FacilityConfig {
    FacilityConfig {
        name: "Credit Facility".to_string(),
        version: "v1.0".to_string(),
        total_capacity: Some(PORTFOLIO_CREDIT_CAPACITY),
        default_backing_value: None,
        categories: BTreeMap::from([(
            "USD".to_string(),
            CategoryRule::ratio("USD Credit Line", MAX_LTV, dec!(0.085), dec!(250000000)),
        )]),
    }
}

fn bond() -> FacilityConfig {
    let categories = [
        ("market", "Market Rate Bond", dec!(0.0575)),
        ("premium", "Premium Bond", dec!(0.045)),
        ("institutional", "Institutional Bond", dec!(0.0625)),
    ]
    .into_iter()
    .map(|(key, label, rate)| {
        (
            key.to_string(),
            CategoryRule::ratio(label, MAX_LTV, rate, PORTFOLIO_CREDIT_CAPACITY),
        )
    })
    .collect();

    FacilityConfig {
        name: "Bond Issuance & LTV".to_string(),
        version: "v1.0".to_string(),
        total_capacity: Some(PORTFOLIO_CREDIT_CAPACITY),
        default_backing_value: Some(PORTFOLIO_VALUE),
        categories,
    }
}

fn business() -> FacilityConfig {
    // (key, label, share of capital, projected ROI)
    let lines = [
        ("real_estate_expansion", "Real Estate Development", dec!(0.40), dec!(0.15)),
        ("infrastructure_development", "Infrastructure Projects", dec!(0.25), dec!(0.12)),
        ("financial_services_expansion", "Financial Services", dec!(0.20), dec!(0.20)),
        ("technology_ventures", "Technology Development", dec!(0.10), dec!(0.25)),
        ("consulting_services", "Consulting & Setup Services", dec!(0.03), dec!(0.35)),
        ("token_economy_development", "Token Economy Expansion", dec!(0.02), dec!(0.30)),
    ];

    let categories = lines
        .into_iter()
        .map(|(key, label, share, roi)| {
            (
                key.to_string(),
                CategoryRule::flat(label, roi, PORTFOLIO_CREDIT_CAPACITY * share),
            )
        })
        .collect();

    FacilityConfig {
        name: "Business Capital Allocation".to_string(),
        version: "v1.0".to_string(),
        total_capacity: Some(PORTFOLIO_CREDIT_CAPACITY),
        default_backing_value: None,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_validate() {
        for preset in Preset::all() {
            preset
                .config()
                .validate()
                .unwrap_or_else(|e| panic!("{preset} failed validation: {e}"));
        }
    }

    #[test]
    fn test_preset_round_trips_through_name() {
        for preset in Preset::all() {
            assert_eq!(preset.to_string().parse::<Preset>().unwrap(), preset);
        }
        assert_eq!(" Escrow ".parse::<Preset>().unwrap(), Preset::Escrow);
        assert!("payroll".parse::<Preset>().is_err());
    }

    #[test]
    fn test_business_shares_sum_to_capital() {
        let config = Preset::Business.config();
        let allocated: Decimal = config.categories.values().map(|r| r.sub_capacity).sum();
        assert_eq!(allocated, PORTFOLIO_CREDIT_CAPACITY);
        assert_eq!(
            config.rule("real_estate_expansion").unwrap().sub_capacity,
            dec!(304000000)
        );
    }

    #[test]
    fn test_escrow_currencies() {
        let config = Preset::Escrow.config();
        let codes: Vec<&str> = config.categories.keys().map(String::as_str).collect();
        assert_eq!(codes, vec!["AUD", "CAD", "EUR", "GBP", "JPY", "USD"]);
        assert_eq!(config.rule("JPY").unwrap().rate, dec!(0.0067));
    }

    #[test]
    fn test_escrow_limits_are_usdt_equivalent() {
        let config = Preset::Escrow.config();

        let gbp = config.rule("GBP").unwrap();
        assert_eq!(gbp.min_request, Some(dec!(80)));
        assert_eq!(gbp.max_request, Some(dec!(40000000)));
        assert_eq!(gbp.min_release, Some(dec!(40)));

        let jpy = config.rule("JPY").unwrap();
        assert_eq!(jpy.min_request, Some(dec!(14925.38)));
        assert_eq!(jpy.max_request, Some(dec!(7462686567.16)));
        assert_eq!(jpy.min_release, Some(dec!(7462.69)));

        for (code, rule) in &config.categories {
            let (min, max) = (rule.min_request.unwrap(), rule.max_request.unwrap());
            assert!(min * rule.rate >= MIN_ISSUANCE_USDT, "{code} minimum");
            assert!(max * rule.rate <= MAX_ISSUANCE_USDT, "{code} maximum");
            assert_eq!(rule.redemption_fee_rate, Some(REDEMPTION_FEE));
        }
    }
}
