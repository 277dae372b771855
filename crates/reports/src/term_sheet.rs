use std::path::{Path, PathBuf};

use chrono::Utc;
use rust_decimal::Decimal;

use facility_common::error::AppError;
use facility_common::rules::{CeilingRule, FacilityConfig};
use facility_common::types::AllocationResult;

use crate::populate::{Fields, populate};

const TERM_SHEET_TEMPLATE: &str = "\
# {{ facility_name }} Term Sheet

| Field | Value |
|-------|-------|
| Evaluation | {{ evaluation_id }} |
| Date | {{ date }} |
| Category | {{ category }} ({{ category_label }}) |
| Decision | **{{ decision }}** |
| Requested | {{ requested_amount }} |
| Backing | {{ backing_value }} |
| Ceiling | {{ ceiling }} |
| Approved | {{ approved_amount }} |
| Effective rate | {{ effective_rate }} |
| Derived value | {{ derived_value }} |
| Fee | {{ fee }} |
| Net value | {{ net_value }} |

Ceiling rule: {{ ceiling_rule }}.

_Version {{ facility_version }}. Figures are computed from static configuration._
";

/// Format an amount with thousands separators, keeping its scale.
pub fn format_amount(value: Decimal) -> String {
    let raw = value.abs().to_string();
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value.is_sign_negative() && !value.is_zero() { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Facility-level placeholders shared by every document.
pub fn facility_fields(config: &FacilityConfig) -> Fields {
    let mut fields = Fields::new();
    fields.insert("facility_name".into(), config.name.clone());
    fields.insert("facility_version".into(), config.version.clone());
    fields.insert("date".into(), Utc::now().format("%B %d, %Y").to_string());
    fields.insert(
        "total_capacity".into(),
        config
            .total_capacity
            .map(format_amount)
            .unwrap_or_else(|| "per category".to_string()),
    );
    fields.insert(
        "categories".into(),
        config.categories.keys().cloned().collect::<Vec<_>>().join(", "),
    );
    fields
}

/// Placeholders describing one evaluation.
pub fn result_fields(result: &AllocationResult) -> Fields {
    let mut fields = Fields::new();
    fields.insert("evaluation_id".into(), result.evaluation_id.to_string());
    fields.insert("category".into(), result.category.clone());
    fields.insert("decision".into(), result.decision.to_string());
    fields.insert("requested_amount".into(), format_amount(result.requested_amount));
    fields.insert(
        "backing_value".into(),
        result
            .backing_value
            .map(format_amount)
            .unwrap_or_else(|| "n/a".to_string()),
    );
    fields.insert("ceiling".into(), format_amount(result.ceiling));
    fields.insert("approved_amount".into(), format_amount(result.approved_amount));
    fields.insert("effective_rate".into(), result.effective_rate.normalize().to_string());
    fields.insert("derived_value".into(), format_amount(result.derived_value));
    fields.insert("fee".into(), format_amount(result.fee));
    fields.insert("net_value".into(), format_amount(result.net_value));
    fields
}

/// Render the built-in Markdown term sheet for one result.
pub fn render_term_sheet(result: &AllocationResult, config: &FacilityConfig) -> String {
    let mut fields = facility_fields(config);
    fields.extend(result_fields(result));

    let (label, rule) = match config.rule(&result.category) {
        Some(rule) => {
            let description = match rule.ceiling_rule {
                CeilingRule::Flat => "flat capacity check".to_string(),
                CeilingRule::Ratio { max_ratio } => format!(
                    "up to {}% of backing value",
                    (max_ratio * Decimal::ONE_HUNDRED).normalize()
                ),
            };
            (rule.label.clone(), description)
        }
        None => (result.category.clone(), "unknown".to_string()),
    };
    fields.insert("category_label".into(), label);
    fields.insert("ceiling_rule".into(), rule);

    populate(TERM_SHEET_TEMPLATE, &fields)
}

/// Write a term sheet as `term_sheet_<category>_<timestamp>_<id>.md`.
pub fn write_term_sheet(
    dir: &Path,
    result: &AllocationResult,
    config: &FacilityConfig,
) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(dir).map_err(|e| AppError::io(dir, e))?;

    let short_id: String = result.evaluation_id.simple().to_string().chars().take(8).collect();
    let path = dir.join(format!(
        "term_sheet_{}_{}_{}.md",
        result.category,
        result.evaluated_at.format("%Y%m%d_%H%M%S"),
        short_id
    ));
    std::fs::write(&path, render_term_sheet(result, config)).map_err(|e| AppError::io(&path, e))?;

    tracing::info!(path = %path.display(), "Term sheet written");
    Ok(path)
}
