//! skysweep-report
//!
//! Strictly a consumer of the session ledger: builds per-account summaries
//! and emits JSON, CSV, and HTML reports plus a dashboard over recent
//! sessions. No AWS calls happen here.

pub mod csv;
pub mod dashboard;
pub mod error;
pub mod html;
pub mod json;
pub mod paths;
pub mod summary;

pub use crate::dashboard::{write_dashboard, DEFAULT_SESSION_LIMIT};
pub use crate::error::ReportError;
pub use crate::paths::OutputLayout;
pub use crate::summary::{build_report, AccountOutcome, SessionFacts, SessionReport};

/// Emit the full report set for one session into the layout.
pub fn write_all(layout: &OutputLayout, report: &SessionReport) -> Result<(), ReportError> {
    json::write_json(&layout.json_dir, report)?;
    csv::write_csv(&layout.csv_dir, report)?;
    html::write_html(&layout.html_dir, report)?;
    write_dashboard(&layout.json_dir, &layout.html_dir, DEFAULT_SESSION_LIMIT)?;
    Ok(())
}
