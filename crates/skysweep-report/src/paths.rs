use std::path::{Path, PathBuf};

use crate::error::ReportError;

/// Output tree: `aws/<service>/reports/{json,html,csv}/` plus dated logs.
pub struct OutputLayout {
    pub json_dir: PathBuf,
    pub html_dir: PathBuf,
    pub csv_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl OutputLayout {
    pub fn create(base: &Path, service: &str) -> Result<Self, ReportError> {
        let reports = base.join("aws").join(service).join("reports");
        let layout = Self {
            json_dir: reports.join("json"),
            html_dir: reports.join("html"),
            csv_dir: reports.join("csv"),
            log_dir: base
                .join("aws")
                .join(service)
                .join("logs")
                .join(jiff::Zoned::now().strftime("%Y-%m-%d").to_string()),
        };
        for dir in [
            &layout.json_dir,
            &layout.html_dir,
            &layout.csv_dir,
            &layout.log_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_creates_all_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::create(dir.path(), "ec2").unwrap();
        assert!(layout.json_dir.is_dir());
        assert!(layout.html_dir.is_dir());
        assert!(layout.csv_dir.is_dir());
        assert!(layout.log_dir.is_dir());
        assert!(layout
            .json_dir
            .to_string_lossy()
            .contains("aws/ec2/reports/json"));
    }
}
