//! Dashboard: one HTML page aggregating the most recent sessions from the
//! JSON report directory, with a success/failure bar per session.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::ReportError;
use crate::json;

const DASHBOARD_TEMPLATE: &str = include_str!("../templates/dashboard.html.tera");
pub const DEFAULT_SESSION_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
struct DashboardRow {
    session_id: String,
    user: String,
    started_at: String,
    dry_run: bool,
    created: usize,
    retired: usize,
    failed: usize,
    /// Success share in percent, for the bar width.
    success_pct: usize,
}

#[derive(Serialize)]
struct DashboardContext {
    generated_at: String,
    sessions: Vec<DashboardRow>,
}

/// Collect the newest `limit` report files. Session ids embed the start
/// timestamp, so sorting file names descending is sorting by recency.
fn recent_reports(json_dir: &Path, limit: usize) -> Result<Vec<PathBuf>, ReportError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(json_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| {
                    let name = n.to_string_lossy();
                    name.starts_with("report_") && name.ends_with(".json")
                })
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths.reverse();
    paths.truncate(limit);
    Ok(paths)
}

/// Render and write `dashboard.html` into `html_dir`.
pub fn write_dashboard(
    json_dir: &Path,
    html_dir: &Path,
    limit: usize,
) -> Result<PathBuf, ReportError> {
    let mut rows = Vec::new();
    for path in recent_reports(json_dir, limit)? {
        let report = match json::read_json(&path) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable report");
                continue;
            }
        };
        let done = report.totals.created + report.totals.retired + report.totals.cleared;
        let total = done + report.totals.failed;
        rows.push(DashboardRow {
            session_id: report.session_id,
            user: report.user,
            started_at: report.started_at.to_string(),
            dry_run: report.dry_run,
            created: report.totals.created,
            retired: report.totals.retired,
            failed: report.totals.failed,
            success_pct: if total == 0 { 100 } else { done * 100 / total },
        });
    }

    let mut tera = Tera::default();
    tera.add_raw_template("dashboard.html", DASHBOARD_TEMPLATE)
        .map_err(|e| ReportError::TemplateParse(e.to_string()))?;
    let context = Context::from_serialize(DashboardContext {
        generated_at: jiff::Timestamp::now().to_string(),
        sessions: rows,
    })
    .map_err(|e| ReportError::TemplateParse(e.to_string()))?;

    let html = tera.render("dashboard.html", &context)?;
    let path = html_dir.join("dashboard.html");
    std::fs::write(&path, html)?;
    tracing::info!(path = %path.display(), "dashboard written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{build_report, SessionFacts};

    fn write_report(dir: &Path, session_id: &str, user: &str) {
        let report = build_report(
            SessionFacts {
                session_id: session_id.to_string(),
                started_at: jiff::Timestamp::now(),
                ended_at: jiff::Timestamp::now(),
                user: user.to_string(),
                dry_run: false,
            },
            Vec::new(),
        );
        json::write_json(dir, &report).unwrap();
    }

    #[test]
    fn dashboard_shows_newest_sessions_first() {
        let dir = tempfile::tempdir().unwrap();
        let json_dir = dir.path().join("json");
        let html_dir = dir.path().join("html");
        std::fs::create_dir_all(&json_dir).unwrap();
        std::fs::create_dir_all(&html_dir).unwrap();

        for i in 0..12 {
            write_report(&json_dir, &format!("20250801_1200{i:02}_aaaa"), "ops");
        }

        let path = write_dashboard(&json_dir, &html_dir, DEFAULT_SESSION_LIMIT).unwrap();
        let html = std::fs::read_to_string(path).unwrap();

        // Latest 10 only: sessions 02..11 appear, 00 and 01 fall off.
        assert!(html.contains("20250801_120011_aaaa"));
        assert!(html.contains("20250801_120002_aaaa"));
        assert!(!html.contains("20250801_120001_aaaa"));
        assert!(!html.contains("20250801_120000_aaaa"));
    }

    #[test]
    fn empty_report_dir_renders_empty_dashboard() {
        let dir = tempfile::tempdir().unwrap();
        let json_dir = dir.path().join("json");
        let html_dir = dir.path().join("html");
        std::fs::create_dir_all(&json_dir).unwrap();
        std::fs::create_dir_all(&html_dir).unwrap();

        let path = write_dashboard(&json_dir, &html_dir, DEFAULT_SESSION_LIMIT).unwrap();
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("skysweep dashboard"));
    }
}
