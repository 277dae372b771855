//! Output adapters over allocation results: Markdown population, term sheets
//! and timestamped JSON/Markdown reports.

pub mod populate;
pub mod report;
pub mod term_sheet;

pub use populate::{Fields, PopulationSummary, populate, populate_dir, populate_file};
pub use report::{Report, ReportSummary};
pub use term_sheet::{facility_fields, render_term_sheet, result_fields, write_term_sheet};
