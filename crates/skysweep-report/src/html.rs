use std::path::{Path, PathBuf};

use tera::{Context, Tera};

use crate::error::ReportError;
use crate::summary::SessionReport;

const REPORT_TEMPLATE: &str = include_str!("../templates/report.html.tera");

/// Render the per-session HTML report: summary cards + per-account table.
pub fn render_html(report: &SessionReport) -> Result<String, ReportError> {
    let mut tera = Tera::default();
    tera.add_raw_template("report.html", REPORT_TEMPLATE)
        .map_err(|e| ReportError::TemplateParse(e.to_string()))?;

    let value = serde_json::to_value(report)?;
    let context =
        Context::from_value(value).map_err(|e| ReportError::TemplateParse(e.to_string()))?;
    Ok(tera.render("report.html", &context)?)
}

/// Write `report_<session_id>.html`.
pub fn write_html(dir: &Path, report: &SessionReport) -> Result<PathBuf, ReportError> {
    let path = dir.join(format!("report_{}.html", report.session_id));
    std::fs::write(&path, render_html(report)?)?;
    tracing::info!(path = %path.display(), "HTML report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{build_report, SessionFacts};
    use skysweep_core::{LedgerEntry, ResourceRef, ResourceType, SessionId};

    #[test]
    fn rendered_report_contains_accounts_and_totals() {
        let reference = ResourceRef {
            resource_id: "i-1".into(),
            resource_type: ResourceType::Instance,
            account_name: "account01".into(),
            account_id: "111111111111".into(),
            region: "us-east-1".into(),
            created_at: jiff::Timestamp::now(),
            session_id: SessionId("20250801_120000_ab12".into()),
            metadata: Default::default(),
        };
        let report = build_report(
            SessionFacts {
                session_id: "20250801_120000_ab12".into(),
                started_at: jiff::Timestamp::now(),
                ended_at: jiff::Timestamp::now(),
                user: "ops".into(),
                dry_run: false,
            },
            vec![LedgerEntry::created(reference)],
        );

        let html = render_html(&report).unwrap();
        assert!(html.contains("20250801_120000_ab12"));
        assert!(html.contains("account01"));
        assert!(html.contains("successful"));
    }
}
