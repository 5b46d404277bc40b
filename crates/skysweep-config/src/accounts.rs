use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level shape of `aws_accounts_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub accounts: BTreeMap<String, AccountEntry>,
    #[serde(default)]
    pub user_settings: UserSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: String,
    pub email: String,
    pub access_key: String,
    pub secret_key: String,
    /// Overrides `user_settings.users_per_account` for this account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_per_account: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub user_regions: Vec<String>,
    #[serde(default = "default_users_per_account")]
    pub users_per_account: u32,
    #[serde(default)]
    pub allowed_instance_types: Vec<String>,
    #[serde(default)]
    pub password: String,
}

fn default_users_per_account() -> u32 {
    1
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            user_regions: Vec::new(),
            users_per_account: default_users_per_account(),
            allowed_instance_types: Vec::new(),
            password: String::new(),
        }
    }
}

/// Entries whose access key still carries the template placeholder.
const PLACEHOLDER_PREFIX: &str = "ADD_";

impl AccountsConfig {
    /// Load and filter the accounts config.
    ///
    /// Placeholder entries (access key starting with `ADD_`) are dropped with
    /// a warning. An empty result after filtering is a hard error; the
    /// engine has nothing to operate on.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AccountsConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.accounts.retain(|name, entry| {
            let usable = !entry.access_key.starts_with(PLACEHOLDER_PREFIX);
            if !usable {
                tracing::warn!(account = %name, "skipping account with placeholder access key");
            }
            usable
        });

        if config.accounts.is_empty() {
            return Err(ConfigError::NoUsableAccounts);
        }

        tracing::info!(
            accounts = config.accounts.len(),
            regions = config.user_settings.user_regions.len(),
            "accounts config loaded"
        );
        Ok(config)
    }

    /// Account names in stable (alphabetical) order.
    pub fn account_names(&self) -> Vec<String> {
        self.accounts.keys().cloned().collect()
    }

    pub fn users_for(&self, name: &str) -> u32 {
        self.accounts
            .get(name)
            .and_then(|a| a.users_per_account)
            .unwrap_or(self.user_settings.users_per_account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("aws_accounts_config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn placeholder_accounts_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "accounts": {
                    "account01": {
                        "account_id": "111111111111",
                        "email": "a@example.com",
                        "access_key": "AKIAREAL",
                        "secret_key": "s1"
                    },
                    "account02": {
                        "account_id": "222222222222",
                        "email": "b@example.com",
                        "access_key": "ADD_ACCESS_KEY_HERE",
                        "secret_key": "ADD_SECRET_KEY_HERE"
                    }
                },
                "user_settings": {
                    "user_regions": ["us-east-1", "us-west-2"],
                    "users_per_account": 2,
                    "allowed_instance_types": ["t3.micro"],
                    "password": "pw"
                }
            }"#,
        );

        let config = AccountsConfig::load(&path).unwrap();
        assert_eq!(config.account_names(), vec!["account01"]);
        assert_eq!(config.users_for("account01"), 2);
    }

    #[test]
    fn all_placeholders_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "accounts": {
                    "account01": {
                        "account_id": "111111111111",
                        "email": "a@example.com",
                        "access_key": "ADD_ACCESS_KEY_HERE",
                        "secret_key": "x"
                    }
                }
            }"#,
        );
        assert!(matches!(
            AccountsConfig::load(&path),
            Err(ConfigError::NoUsableAccounts)
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AccountsConfig::load(&dir.path().join("nope.json")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn per_account_user_count_overrides_global() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "accounts": {
                    "account01": {
                        "account_id": "111111111111",
                        "email": "a@example.com",
                        "access_key": "AKIAREAL",
                        "secret_key": "s1",
                        "users_per_account": 5
                    }
                },
                "user_settings": {"users_per_account": 2}
            }"#,
        );
        let config = AccountsConfig::load(&path).unwrap();
        assert_eq!(config.users_for("account01"), 5);
        assert_eq!(config.users_for("unknown"), 2);
    }
}
