use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("accounts config has no usable accounts (all entries missing or placeholder)")]
    NoUsableAccounts,

    #[error("no IAM credentials file matching iam_users_credentials_*.json in {0}")]
    NoIamCredentialsFile(PathBuf),

    #[error("no AMI configured for region {0}")]
    NoAmiForRegion(String),
}
