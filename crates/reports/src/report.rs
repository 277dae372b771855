//! JSON/Markdown report snapshots.
//!
//! A report bundles the active configuration, a batch of results and an
//! optional ledger snapshot. `content_hash` is the SHA-256 of the report body
//! serialized with an empty hash field; it is informational only.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use facility_common::error::{AllocationError, AppError};
use facility_common::rules::FacilityConfig;
use facility_common::types::{AllocationResult, Decision};
use facility_engine::LedgerSnapshot;

use crate::term_sheet::format_amount;

/// Aggregate counts and sums over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub evaluated: usize,
    pub approved: usize,
    pub partial: usize,
    pub declined: usize,
    pub total_requested: Decimal,
    pub total_approved: Decimal,
    pub total_derived: Decimal,
    pub total_fees: Decimal,
}

impl ReportSummary {
    /// Fails when a batch total leaves the `Decimal` range.
    pub fn from_results(results: &[AllocationResult]) -> Result<Self, AllocationError> {
        results.iter().try_fold(Self::default(), |mut acc, r| {
            acc.evaluated += 1;
            match r.decision {
                Decision::Approved => acc.approved += 1,
                Decision::Partial => acc.partial += 1,
                Decision::Declined => acc.declined += 1,
            }
            acc.total_requested = sum(acc.total_requested, r.requested_amount, "requested")?;
            acc.total_approved = sum(acc.total_approved, r.approved_amount, "approved")?;
            acc.total_derived = sum(acc.total_derived, r.derived_value, "derived")?;
            acc.total_fees = sum(acc.total_fees, r.fee, "fees")?;
            Ok(acc)
        })
    }
}

fn sum(total: Decimal, value: Decimal, field: &str) -> Result<Decimal, AllocationError> {
    total.checked_add(value).ok_or_else(|| {
        AllocationError::InvalidRequest(format!(
            "total {field} of the batch exceeds the representable range"
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub facility: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub config: FacilityConfig,
    pub summary: ReportSummary,
    pub results: Vec<AllocationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerSnapshot>,
    pub content_hash: String,
}

impl Report {
    pub fn new(
        config: &FacilityConfig,
        results: Vec<AllocationResult>,
        ledger: Option<LedgerSnapshot>,
    ) -> Result<Self, AppError> {
        let mut report = Self {
            facility: config.name.clone(),
            version: config.version.clone(),
            generated_at: Utc::now(),
            config: config.clone(),
            summary: ReportSummary::from_results(&results)?,
            results,
            ledger,
            content_hash: String::new(),
        };
        report.content_hash = report.compute_hash()?;
        Ok(report)
    }

    /// SHA-256 (hex) of the body with `content_hash` blanked.
    pub fn compute_hash(&self) -> Result<String, AppError> {
        let body = Self {
            content_hash: String::new(),
            ..self.clone()
        };
        let bytes = serde_json::to_vec(&body)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// `<prefix>_<YYYYmmdd_HHMMSS>.<ext>` under `dir`.
    pub fn file_path(&self, dir: &Path, prefix: &str, ext: &str) -> PathBuf {
        dir.join(format!(
            "{prefix}_{}.{ext}",
            self.generated_at.format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn write_json(&self, dir: &Path, prefix: &str) -> Result<PathBuf, AppError> {
        let body = serde_json::to_string_pretty(self)?;
        self.write(dir, self.file_path(dir, prefix, "json"), body)
    }

    pub fn write_markdown(&self, dir: &Path, prefix: &str) -> Result<PathBuf, AppError> {
        self.write(dir, self.file_path(dir, prefix, "md"), self.to_markdown())
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!("# {} Allocation Report\n\n", self.facility));
        md.push_str(&format!(
            "Generated {} (version {})\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.version
        ));

        let s = &self.summary;
        md.push_str("## Summary\n\n");
        md.push_str(&format!(
            "- Evaluated: {} ({} approved, {} partial, {} declined)\n",
            s.evaluated, s.approved, s.partial, s.declined
        ));
        md.push_str(&format!("- Requested: {}\n", format_amount(s.total_requested)));
        md.push_str(&format!("- Approved: {}\n", format_amount(s.total_approved)));
        md.push_str(&format!("- Derived: {}\n", format_amount(s.total_derived)));
        md.push_str(&format!("- Fees: {}\n\n", format_amount(s.total_fees)));

        md.push_str("## Results\n\n");
        md.push_str("| Category | Decision | Requested | Approved | Rate | Derived |\n");
        md.push_str("|----------|----------|-----------|----------|------|---------|\n");
        for r in &self.results {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                r.category,
                r.decision,
                format_amount(r.requested_amount),
                format_amount(r.approved_amount),
                r.effective_rate.normalize(),
                format_amount(r.derived_value),
            ));
        }

        if let Some(ledger) = &self.ledger {
            md.push_str("\n## Capacity\n\n");
            md.push_str("| Category | Label | Capacity | Drawn | Remaining | Utilization |\n");
            md.push_str("|----------|-------|----------|-------|-----------|-------------|\n");
            for c in &ledger.categories {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {}% |\n",
                    c.category,
                    c.label,
                    format_amount(c.sub_capacity),
                    format_amount(c.drawn),
                    format_amount(c.remaining),
                    (c.utilization * Decimal::ONE_HUNDRED).normalize(),
                ));
            }
            if let Some(remaining) = ledger.total_remaining {
                md.push_str(&format!(
                    "\nTotal drawn {} of {}, {} remaining.\n",
                    format_amount(ledger.total_drawn),
                    ledger.total_capacity.map(format_amount).unwrap_or_default(),
                    format_amount(remaining),
                ));
            }
        }

        md.push_str(&format!("\nContent hash: `{}`\n", self.content_hash));
        md
    }

    fn write(&self, dir: &Path, path: PathBuf, body: String) -> Result<PathBuf, AppError> {
        std::fs::create_dir_all(dir).map_err(|e| AppError::io(dir, e))?;
        std::fs::write(&path, body).map_err(|e| AppError::io(&path, e))?;
        tracing::info!(path = %path.display(), results = self.results.len(), "Report written");
        Ok(path)
    }
}
