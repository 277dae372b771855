//! Document population: placeholder substitution in Markdown files.
//!
//! Recognised placeholder forms for a field named `entity_name`:
//! `{{ entity_name }}`, `{{entity_name}}`, `[ENTITY_NAME]`, `<entity_name>`,
//! `$entity_name$` and `#entity_name#`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use facility_common::error::AppError;

/// Placeholder name → replacement text.
pub type Fields = BTreeMap<String, String>;

const POPULATED_SUFFIX: &str = "_POPULATED";

/// A file that could not be populated, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct PopulationFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of populating a directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulationSummary {
    pub populated: Vec<PathBuf>,
    pub failed: Vec<PopulationFailure>,
}

/// Substitute every placeholder form for every field.
///
/// One left-to-right pass: replacement text is never scanned again, so a value
/// that happens to look like another placeholder is written out verbatim.
pub fn populate(template: &str, fields: &Fields) -> String {
    let mut patterns: Vec<(String, &str)> = fields
        .iter()
        .filter(|(field, _)| !field.is_empty())
        .flat_map(|(field, value)| {
            [
                format!("{{{{ {field} }}}}"),
                format!("{{{{{field}}}}}"),
                format!("[{}]", field.to_uppercase()),
                format!("<{field}>"),
                format!("${field}$"),
                format!("#{field}#"),
            ]
            .into_iter()
            .map(move |pattern| (pattern, value.as_str()))
        })
        .collect();
    // Longest first so `{{ a_b }}` wins over a shorter overlapping form.
    patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut content = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(ch) = rest.chars().next() {
        match patterns.iter().find(|(pattern, _)| rest.starts_with(pattern.as_str())) {
            Some((pattern, value)) => {
                content.push_str(value);
                rest = &rest[pattern.len()..];
            }
            None => {
                content.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    content
}

/// `docs/term_sheet.md` → `docs/term_sheet_POPULATED.md`
pub fn populated_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{POPULATED_SUFFIX}.md"))
}

/// Populate one document and write it beside the source.
pub fn populate_file(path: &Path, fields: &Fields) -> Result<PathBuf, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    let output = populated_path(path);
    std::fs::write(&output, populate(&content, fields)).map_err(|e| AppError::io(&output, e))?;

    tracing::debug!(source = %path.display(), output = %output.display(), "Populated document");
    Ok(output)
}

/// Populate every `.md` document in a directory.
///
/// Files that fail are skipped and reported; only an unreadable directory
/// fails the call.
pub fn populate_dir(dir: &Path, fields: &Fields) -> Result<PopulationSummary, AppError> {
    let mut documents: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| AppError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_source_document(path))
        .collect();
    documents.sort();

    let mut summary = PopulationSummary::default();
    for path in documents {
        match populate_file(&path, fields) {
            Ok(output) => summary.populated.push(output),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping document");
                summary.failed.push(PopulationFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        populated = summary.populated.len(),
        failed = summary.failed.len(),
        "Document population finished"
    );

    Ok(summary)
}

fn is_source_document(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == "md")
        && !path
            .file_stem()
            .is_some_and(|stem| stem.to_string_lossy().ends_with(POPULATED_SUFFIX))
}
