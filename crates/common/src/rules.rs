//! Static rule tables consumed by the calculator.
//!
//! A `FacilityConfig` is loaded once at startup (from a preset or a JSON file),
//! validated, and then shared read-only.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How the ceiling for a category is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CeilingRule {
    /// Ceiling is the remaining sub-capacity.
    Flat,
    /// Ceiling is `min(remaining sub-capacity, backing_value * max_ratio)`.
    Ratio { max_ratio: Decimal },
}

/// Configuration record for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub label: String,
    pub ceiling_rule: CeilingRule,
    /// Fee, exchange rate, interest rate or backing ratio applied to the approved amount.
    pub rate: Decimal,
    pub sub_capacity: Decimal,
    /// Fraction of the derived value withheld as a fee (e.g. issuance fee).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<Decimal>,
    /// Smallest request accepted at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_request: Option<Decimal>,
    /// Per-transaction cap; lowers the ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_request: Option<Decimal>,
    /// Decimal places kept on derived values and fees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    /// Fraction of a released amount withheld on redemption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redemption_fee_rate: Option<Decimal>,
    /// Smallest release accepted, in category units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_release: Option<Decimal>,
}

impl CategoryRule {
    pub fn flat(label: impl Into<String>, rate: Decimal, sub_capacity: Decimal) -> Self {
        Self {
            label: label.into(),
            ceiling_rule: CeilingRule::Flat,
            rate,
            sub_capacity,
            fee_rate: None,
            min_request: None,
            max_request: None,
            precision: None,
            redemption_fee_rate: None,
            min_release: None,
        }
    }

    pub fn ratio(
        label: impl Into<String>,
        max_ratio: Decimal,
        rate: Decimal,
        sub_capacity: Decimal,
    ) -> Self {
        Self {
            ceiling_rule: CeilingRule::Ratio { max_ratio },
            ..Self::flat(label, rate, sub_capacity)
        }
    }

    pub fn with_fee_rate(mut self, fee_rate: Decimal) -> Self {
        self.fee_rate = Some(fee_rate);
        self
    }

    pub fn with_request_limits(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_request = min;
        self.max_request = max;
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_redemption(mut self, fee_rate: Decimal, min_release: Option<Decimal>) -> Self {
        self.redemption_fee_rate = Some(fee_rate);
        self.min_release = min_release;
        self
    }

    fn validate(&self, category: &str) -> Result<(), AppError> {
        let fail = |msg: String| Err(AppError::Config(format!("category {category}: {msg}")));

        if self.sub_capacity < Decimal::ZERO {
            return fail(format!("sub_capacity must not be negative (got {})", self.sub_capacity));
        }
        if self.rate < Decimal::ZERO {
            return fail(format!("rate must not be negative (got {})", self.rate));
        }
        if let CeilingRule::Ratio { max_ratio } = self.ceiling_rule
            && max_ratio < Decimal::ZERO
        {
            return fail(format!("max_ratio must not be negative (got {max_ratio})"));
        }
        if let Some(fee) = self.fee_rate
            && (fee < Decimal::ZERO || fee > Decimal::ONE)
        {
            return fail(format!("fee_rate must be within [0, 1] (got {fee})"));
        }
        if let Some(fee) = self.redemption_fee_rate
            && (fee < Decimal::ZERO || fee > Decimal::ONE)
        {
            return fail(format!("redemption_fee_rate must be within [0, 1] (got {fee})"));
        }
        if let Some(min) = self.min_release
            && min < Decimal::ZERO
        {
            return fail(format!("min_release must not be negative (got {min})"));
        }
        if let (Some(min), Some(max)) = (self.min_request, self.max_request)
            && min > max
        {
            return fail(format!("min_request {min} exceeds max_request {max}"));
        }
        if let Some(precision) = self.precision
            && precision > 28
        {
            return fail(format!("precision must be at most 28 (got {precision})"));
        }
        Ok(())
    }
}

/// Immutable configuration for one facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityConfig {
    pub name: String,
    /// Free-text version carried into reports.
    pub version: String,
    /// Capacity shared by all categories. `None` means categories are bounded only
    /// by their own sub-capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_capacity: Option<Decimal>,
    /// Stands in for a request's backing value when the request omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_backing_value: Option<Decimal>,
    pub categories: BTreeMap<String, CategoryRule>,
}

impl FacilityConfig {
    pub fn rule(&self, category: &str) -> Option<&CategoryRule> {
        self.categories.get(category)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.categories.is_empty() {
            return Err(AppError::Config(format!(
                "facility {} defines no categories",
                self.name
            )));
        }
        if let Some(total) = self.total_capacity
            && total < Decimal::ZERO
        {
            return Err(AppError::Config(format!(
                "total_capacity must not be negative (got {total})"
            )));
        }
        if let Some(backing) = self.default_backing_value
            && backing < Decimal::ZERO
        {
            return Err(AppError::Config(format!(
                "default_backing_value must not be negative (got {backing})"
            )));
        }
        for (category, rule) in &self.categories {
            rule.validate(category)?;
        }
        // Drawn totals are summed across categories; the sum must stay representable.
        if self.total_capacity.is_none()
            && self
                .categories
                .values()
                .try_fold(Decimal::ZERO, |acc, rule| acc.checked_add(rule.sub_capacity))
                .is_none()
        {
            return Err(AppError::Config(format!(
                "facility {}: combined sub_capacity overflows, set total_capacity",
                self.name
            )));
        }
        Ok(())
    }

    /// Load and validate a rule table from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
        let config: FacilityConfig = serde_json::from_str(&raw)?;
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            facility = %config.name,
            categories = config.categories.len(),
            "Loaded facility rules"
        );

        Ok(config)
    }
}
