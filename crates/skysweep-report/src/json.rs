use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::summary::SessionReport;

/// Write the full session report as pretty JSON.
/// File name: `report_<session_id>.json`.
pub fn write_json(dir: &Path, report: &SessionReport) -> Result<PathBuf, ReportError> {
    let path = dir.join(format!("report_{}.json", report.session_id));
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(&path, json)?;
    tracing::info!(path = %path.display(), "JSON report written");
    Ok(path)
}

/// Read a previously written report (dashboard input).
pub fn read_json(path: &Path) -> Result<SessionReport, ReportError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{build_report, SessionFacts};

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let report = build_report(
            SessionFacts {
                session_id: "20250801_120000_ab12".into(),
                started_at: jiff::Timestamp::now(),
                ended_at: jiff::Timestamp::now(),
                user: "ops".into(),
                dry_run: true,
            },
            Vec::new(),
        );

        let path = write_json(dir.path(), &report).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("report_20250801_120000_ab12"));

        let back = read_json(&path).unwrap();
        assert_eq!(back.session_id, report.session_id);
        assert!(back.dry_run);
    }
}
