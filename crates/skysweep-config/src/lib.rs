//! skysweep-config
//!
//! Loaders for the four external files the engine consumes:
//!
//! - `aws_accounts_config.json` - root account credentials + user settings
//! - `iam_users_credentials_<YYYYMMDD>_<HHMMSS>.json` - generated IAM users
//! - `ec2-region-ami-mapping.json` - per-region AMIs and instance types
//! - `user_mapping.json` - username → real-person mapping (optional)
//!
//! Parsing is strict where the engine depends on a field and lenient where
//! the original files carry extra operator-facing metadata.

pub mod accounts;
pub mod ami;
pub mod error;
pub mod iam_file;
pub mod user_mapping;

pub use crate::accounts::{AccountEntry, AccountsConfig, UserSettings};
pub use crate::ami::AmiMapping;
pub use crate::error::ConfigError;
pub use crate::iam_file::{IamAccount, IamCredentialsFile, IamUserRecord};
pub use crate::user_mapping::UserMapping;
