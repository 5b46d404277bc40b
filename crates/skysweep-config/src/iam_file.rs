use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shape of a generated `iam_users_credentials_<YYYYMMDD>_<HHMMSS>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IamCredentialsFile {
    #[serde(default)]
    pub created_date: String,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub total_users: u32,
    pub accounts: BTreeMap<String, IamAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IamAccount {
    pub account_id: String,
    #[serde(default)]
    pub account_email: String,
    pub users: Vec<IamUserRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IamUserRecord {
    pub username: String,
    #[serde(default)]
    pub real_user: Option<RealUser>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub console_password: String,
    #[serde(default)]
    pub console_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealUser {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

const FILE_PREFIX: &str = "iam_users_credentials_";

impl IamCredentialsFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find the newest credentials file in `dir` and load it.
    ///
    /// Multiple generations may coexist; the filename embeds the creation
    /// timestamp, so lexicographic order on the name is chronological order.
    pub fn load_newest(dir: &Path) -> Result<(Self, PathBuf), ConfigError> {
        let newest = Self::list_files(dir)?
            .into_iter()
            .max()
            .ok_or_else(|| ConfigError::NoIamCredentialsFile(dir.to_path_buf()))?;
        let parsed = Self::load(&newest)?;
        tracing::info!(path = %newest.display(), accounts = parsed.accounts.len(), "IAM credentials file loaded");
        Ok((parsed, newest))
    }

    /// All credential files in `dir`, unordered.
    pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(FILE_PREFIX) && name.ends_with(".json") {
                files.push(entry.path());
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "created_date": "2025-07-30",
        "created_time": "14:22:33",
        "created_by": "ops",
        "total_users": 1,
        "accounts": {
            "account03": {
                "account_id": "333333333333",
                "account_email": "acct3@example.com",
                "users": [{
                    "username": "account03_clouduser01",
                    "real_user": {"first_name": "Pat", "last_name": "Kim", "full_name": "Pat Kim", "email": "pat@example.com"},
                    "region": "us-east-1",
                    "access_key_id": "AKIA333",
                    "secret_access_key": "secret",
                    "console_password": "pw",
                    "console_url": "https://333333333333.signin.aws.amazon.com/console"
                }]
            }
        }
    }"#;

    #[test]
    fn parses_full_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iam_users_credentials_20250730_142233.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let file = IamCredentialsFile::load(&path).unwrap();
        let account = &file.accounts["account03"];
        assert_eq!(account.account_id, "333333333333");
        assert_eq!(account.users[0].username, "account03_clouduser01");
        assert_eq!(account.users[0].region, "us-east-1");
    }

    #[test]
    fn newest_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "iam_users_credentials_20250101_000000.json",
            "iam_users_credentials_20250730_142233.json",
            "iam_users_credentials_20250615_090000.json",
        ] {
            std::fs::write(dir.path().join(name), SAMPLE).unwrap();
        }
        // A non-matching file must not be picked up.
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let (_, path) = IamCredentialsFile::load_newest(dir.path()).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("20250730_142233"));
    }

    #[test]
    fn empty_dir_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            IamCredentialsFile::load_newest(dir.path()),
            Err(ConfigError::NoIamCredentialsFile(_))
        ));
    }
}
