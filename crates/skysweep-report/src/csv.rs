//! CSV export: one row per (account, resource type), for spreadsheet
//! analysis across sessions.

use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::summary::SessionReport;

const HEADER: &str = "session_id,account_name,account_id,resource_type,created,retired,failed";

/// Quote a field per RFC 4180 when it contains a comma, quote, or newline.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn render_csv(report: &SessionReport) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for account in &report.accounts {
        for (resource_type, counts) in &account.by_type {
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                escape(&report.session_id),
                escape(&account.account_name),
                escape(&account.account_id),
                escape(resource_type),
                counts.created,
                counts.retired,
                counts.failed,
            ));
        }
    }
    out
}

/// Write `report_<session_id>.csv`.
pub fn write_csv(dir: &Path, report: &SessionReport) -> Result<PathBuf, ReportError> {
    let path = dir.join(format!("report_{}.csv", report.session_id));
    std::fs::write(&path, render_csv(report))?;
    tracing::info!(path = %path.display(), "CSV report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{build_report, SessionFacts};
    use skysweep_core::{LedgerEntry, ResourceRef, ResourceType, SessionId};

    fn report_with_entries() -> SessionReport {
        let reference = ResourceRef {
            resource_id: "i-1".into(),
            resource_type: ResourceType::Instance,
            account_name: "account, with comma".into(),
            account_id: "111111111111".into(),
            region: "us-east-1".into(),
            created_at: jiff::Timestamp::now(),
            session_id: SessionId("20250801_120000_ab12".into()),
            metadata: Default::default(),
        };
        build_report(
            SessionFacts {
                session_id: "20250801_120000_ab12".into(),
                started_at: jiff::Timestamp::now(),
                ended_at: jiff::Timestamp::now(),
                user: "ops".into(),
                dry_run: false,
            },
            vec![LedgerEntry::created(reference)],
        )
    }

    #[test]
    fn rows_have_header_and_escaping() {
        let csv = render_csv(&report_with_entries());
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), HEADER);
        let row = lines.next().unwrap();
        assert!(row.contains("\"account, with comma\""));
        assert!(row.contains("instance"));
        assert!(row.ends_with("1,0,0"));
    }

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(escape("he said \"hi\""), "\"he said \"\"hi\"\"\"");
        assert_eq!(escape("plain"), "plain");
    }
}
