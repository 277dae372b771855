use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AllocationError;

/// Outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    Partial,
    Declined,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Approved => write!(f, "APPROVED"),
            Decision::Partial => write!(f, "PARTIAL"),
            Decision::Declined => write!(f, "DECLINED"),
        }
    }
}

/// Unvalidated request as it arrives from JSON or the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInput {
    pub category: String,
    pub requested_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_value: Option<Decimal>,
}

/// A validated request for credit, issuance or capital.
///
/// Fields are private so that `requested_amount > 0` and
/// `backing_value >= 0` hold for every instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequestInput")]
pub struct AllocationRequest {
    category: String,
    requested_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    backing_value: Option<Decimal>,
}

impl AllocationRequest {
    pub fn new(
        category: impl Into<String>,
        requested_amount: Decimal,
        backing_value: Option<Decimal>,
    ) -> Result<Self, AllocationError> {
        let category = category.into().trim().to_string();
        if category.is_empty() {
            return Err(AllocationError::InvalidRequest(
                "category must not be empty".to_string(),
            ));
        }
        if requested_amount <= Decimal::ZERO {
            return Err(AllocationError::InvalidRequest(format!(
                "requested_amount must be greater than zero (got {requested_amount})"
            )));
        }
        if let Some(backing) = backing_value
            && backing < Decimal::ZERO
        {
            return Err(AllocationError::InvalidRequest(format!(
                "backing_value must not be negative (got {backing})"
            )));
        }

        Ok(Self {
            category,
            requested_amount,
            backing_value,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn requested_amount(&self) -> Decimal {
        self.requested_amount
    }

    pub fn backing_value(&self) -> Option<Decimal> {
        self.backing_value
    }
}

impl TryFrom<RequestInput> for AllocationRequest {
    type Error = AllocationError;

    fn try_from(input: RequestInput) -> Result<Self, Self::Error> {
        Self::new(input.category, input.requested_amount, input.backing_value)
    }
}

/// Result of evaluating one `AllocationRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub evaluation_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub category: String,
    pub decision: Decision,
    pub requested_amount: Decimal,
    /// Always within `0..=requested_amount`.
    pub approved_amount: Decimal,
    /// Backing actually used, after the configured default was applied.
    pub backing_value: Option<Decimal>,
    pub ceiling: Decimal,
    pub effective_rate: Decimal,
    /// `approved_amount * effective_rate`
    pub derived_value: Decimal,
    pub fee: Decimal,
    pub net_value: Decimal,
}

impl AllocationResult {
    /// Compare computed fields only, ignoring the id and timestamp.
    pub fn is_same_outcome(&self, other: &Self) -> bool {
        self.category == other.category
            && self.decision == other.decision
            && self.requested_amount == other.requested_amount
            && self.approved_amount == other.approved_amount
            && self.backing_value == other.backing_value
            && self.ceiling == other.ceiling
            && self.effective_rate == other.effective_rate
            && self.derived_value == other.derived_value
            && self.fee == other.fee
            && self.net_value == other.net_value
    }
}
