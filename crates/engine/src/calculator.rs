//! Allocation calculator: deterministic approval decisions from a static rule table.
//!
//! For each request:
//! 1. Resolve the category rule (unknown → `UnsupportedCategory`)
//! 2. Compute the ceiling from remaining capacity, per-transaction cap and backing
//! 3. Approve in full, partially up to the ceiling, or decline
//! 4. Derive the secondary value (`approved * rate`) and fee
//!
//! The calculator holds no mutable state; running totals live in `CapacityLedger`.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use facility_common::error::AllocationError;
use facility_common::rules::{CategoryRule, CeilingRule, FacilityConfig};
use facility_common::types::{AllocationRequest, AllocationResult, Decision};

/// Capacity still available when a request is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    /// Remaining sub-capacity of the request's category.
    pub category: Decimal,
    /// Remaining facility-wide capacity, if the facility has one.
    pub total: Option<Decimal>,
}

/// Stateless calculator over an immutable `FacilityConfig`.
#[derive(Debug, Clone)]
pub struct Calculator {
    config: Arc<FacilityConfig>,
}

impl Calculator {
    pub fn new(config: Arc<FacilityConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FacilityConfig {
        &self.config
    }

    /// Look up the rule for a category.
    pub fn rule(&self, category: &str) -> Result<&CategoryRule, AllocationError> {
        self.config.rule(category).ok_or_else(|| {
            let supported: Vec<&str> = self.config.categories.keys().map(String::as_str).collect();
            AllocationError::UnsupportedCategory(format!(
                "{category} (supported: {})",
                supported.join(", ")
            ))
        })
    }

    /// Full configured capacity for a category, as seen by a stateless evaluation.
    pub fn full_capacity(&self, category: &str) -> Result<Remaining, AllocationError> {
        let rule = self.rule(category)?;
        Ok(Remaining {
            category: rule.sub_capacity,
            total: self.config.total_capacity,
        })
    }

    /// Evaluate a request against the full configured capacity.
    pub fn evaluate(&self, request: &AllocationRequest) -> Result<AllocationResult, AllocationError> {
        let remaining = self.full_capacity(request.category())?;
        self.evaluate_against(request, remaining)
    }

    /// Maximum approvable amount for a request given the remaining capacity.
    pub fn ceiling(
        &self,
        request: &AllocationRequest,
        remaining: Remaining,
    ) -> Result<Decimal, AllocationError> {
        let rule = self.rule(request.category())?;
        let backing = self.resolve_backing(request, rule)?;
        Ok(Self::ceiling_for(rule, backing, remaining))
    }

    /// Check everything about a request that does not depend on remaining capacity:
    /// the category exists, the minimum request is met and a backing value resolves.
    pub fn validate(&self, request: &AllocationRequest) -> Result<(), AllocationError> {
        let rule = self.rule(request.category())?;
        Self::check_minimum(request, rule)?;
        self.resolve_backing(request, rule)?;
        Ok(())
    }

    /// Evaluate a request against explicit remaining capacity.
    pub fn evaluate_against(
        &self,
        request: &AllocationRequest,
        remaining: Remaining,
    ) -> Result<AllocationResult, AllocationError> {
        let rule = self.rule(request.category())?;
        Self::check_minimum(request, rule)?;

        let backing = self.resolve_backing(request, rule)?;
        let ceiling = Self::ceiling_for(rule, backing, remaining);
        let requested = request.requested_amount();

        let (decision, approved_amount) = if requested <= ceiling {
            (Decision::Approved, requested)
        } else if ceiling > Decimal::ZERO {
            (Decision::Partial, ceiling)
        } else {
            (Decision::Declined, Decimal::ZERO)
        };

        let derived_value = Self::round(
            checked(approved_amount.checked_mul(rule.rate), request, "derived_value")?,
            rule.precision,
        );
        let fee = match rule.fee_rate {
            Some(fee_rate) => Self::round(
                checked(derived_value.checked_mul(fee_rate), request, "fee")?,
                rule.precision,
            ),
            None => Decimal::ZERO,
        };

        tracing::debug!(
            category = request.category(),
            requested = %requested,
            ceiling = %ceiling,
            approved = %approved_amount,
            decision = %decision,
            "Evaluated allocation request"
        );

        Ok(AllocationResult {
            evaluation_id: Uuid::new_v4(),
            evaluated_at: Utc::now(),
            category: request.category().to_string(),
            decision,
            requested_amount: requested,
            approved_amount,
            backing_value: backing,
            ceiling,
            effective_rate: rule.rate,
            derived_value,
            fee,
            net_value: derived_value - fee,
        })
    }

    fn check_minimum(request: &AllocationRequest, rule: &CategoryRule) -> Result<(), AllocationError> {
        match rule.min_request {
            Some(min) if request.requested_amount() < min => {
                Err(AllocationError::InvalidRequest(format!(
                    "requested_amount {} is below the {} minimum of {min}",
                    request.requested_amount(),
                    request.category()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Request backing, else the configured default. Ratio rules cannot run without one.
    fn resolve_backing(
        &self,
        request: &AllocationRequest,
        rule: &CategoryRule,
    ) -> Result<Option<Decimal>, AllocationError> {
        let backing = request.backing_value().or_else(|| {
            let default = self.config.default_backing_value;
            if default.is_some() {
                tracing::debug!(
                    category = request.category(),
                    "Using configured default backing value"
                );
            }
            default
        });

        if backing.is_none() && matches!(rule.ceiling_rule, CeilingRule::Ratio { .. }) {
            return Err(AllocationError::InvalidRequest(format!(
                "backing_value is required for {} and no default is configured",
                request.category()
            )));
        }
        Ok(backing)
    }

    fn ceiling_for(rule: &CategoryRule, backing: Option<Decimal>, remaining: Remaining) -> Decimal {
        let mut ceiling = remaining.category;
        if let Some(total) = remaining.total {
            ceiling = ceiling.min(total);
        }
        if let Some(max) = rule.max_request {
            ceiling = ceiling.min(max);
        }
        if let (CeilingRule::Ratio { max_ratio }, Some(backing)) = (rule.ceiling_rule, backing) {
            // A product past Decimal::MAX never binds below the other limits.
            ceiling = ceiling.min(backing.checked_mul(max_ratio).unwrap_or(Decimal::MAX));
        }
        ceiling.max(Decimal::ZERO)
    }

    fn round(value: Decimal, precision: Option<u32>) -> Decimal {
        match precision {
            Some(dp) => value.round_dp(dp),
            None => value,
        }
    }
}

fn checked(
    value: Option<Decimal>,
    request: &AllocationRequest,
    field: &str,
) -> Result<Decimal, AllocationError> {
    value.ok_or_else(|| {
        AllocationError::InvalidRequest(format!(
            "{field} for {} {} exceeds the representable range",
            request.requested_amount(),
            request.category()
        ))
    })
}
