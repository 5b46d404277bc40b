//! Credential resolution: turn config files plus a selection expression into
//! validated [`CredentialHandle`]s.
//!
//! Validation is one STS `GetCallerIdentity` per handle. A handle whose
//! reported account id disagrees with the configured one is excluded; a
//! mixed-up credentials file must never operate on the wrong account.

use skysweep_config::{AccountsConfig, IamCredentialsFile};
use skysweep_core::{parse_selection, CredentialHandle, CredentialKind};

use crate::error::EngineError;
use crate::sdk;

/// Outcome of validating one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Ok,
    /// STS answered with a different account id than configured.
    Mismatch { reported: String },
    /// STS could not be reached or rejected the credentials.
    Unreachable { reason: String },
}

/// Build root handles from the accounts config.
///
/// `account_selection` and `region_selection` are selection expressions over
/// the alphabetical account list and the configured region list.
pub fn root_handles(
    config: &AccountsConfig,
    account_selection: &str,
    region_selection: &str,
) -> Result<Vec<CredentialHandle>, EngineError> {
    let names = config.account_names();
    let selected = parse_selection(account_selection, names.len())?;

    let all_regions = &config.user_settings.user_regions;
    let region_indices = parse_selection(region_selection, all_regions.len())?;
    let regions: Vec<String> = region_indices
        .iter()
        .map(|i| all_regions[i - 1].clone())
        .collect();

    let mut handles = Vec::new();
    for index in selected {
        let name = &names[index - 1];
        let entry = &config.accounts[name];
        handles.push(CredentialHandle {
            account_name: name.clone(),
            account_id: entry.account_id.clone(),
            email: entry.email.clone(),
            access_key: entry.access_key.clone(),
            secret_key: entry.secret_key.clone(),
            kind: CredentialKind::Root,
            username: None,
            regions: regions.clone(),
        });
    }
    Ok(handles)
}

/// Build IAM handles from a generated credentials file: one handle per
/// (account, user), each scoped to the user's home region.
pub fn iam_handles(
    file: &IamCredentialsFile,
    account_selection: &str,
) -> Result<Vec<CredentialHandle>, EngineError> {
    let names: Vec<&String> = file.accounts.keys().collect();
    let selected = parse_selection(account_selection, names.len())?;

    let mut handles = Vec::new();
    for index in selected {
        let name = names[index - 1];
        let account = &file.accounts[name];
        for user in &account.users {
            handles.push(CredentialHandle {
                account_name: name.clone(),
                account_id: account.account_id.clone(),
                email: account.account_email.clone(),
                access_key: user.access_key_id.clone(),
                secret_key: user.secret_access_key.clone(),
                kind: CredentialKind::Iam,
                username: Some(user.username.clone()),
                regions: vec![user.region.clone()],
            });
        }
    }
    Ok(handles)
}

/// Validate one handle against STS.
pub async fn validate(handle: &CredentialHandle) -> Validation {
    let region = handle
        .regions
        .first()
        .map(String::as_str)
        .unwrap_or("us-east-1");
    let config = sdk::sdk_config(handle, region).await;
    let sts = aws_sdk_sts::Client::new(&config);

    match sts.get_caller_identity().send().await {
        Ok(identity) => {
            let reported = identity.account().unwrap_or_default();
            if reported == handle.account_id {
                Validation::Ok
            } else {
                Validation::Mismatch {
                    reported: reported.to_string(),
                }
            }
        }
        Err(e) => Validation::Unreachable {
            reason: crate::error::format_err_chain(&e),
        },
    }
}

/// Validate a set of handles and keep the good ones.
///
/// Per-handle failures are logged and reported; an empty validated set aborts
/// the session with `NoValidCredentials`.
pub async fn validate_all(
    handles: Vec<CredentialHandle>,
) -> Result<Vec<CredentialHandle>, EngineError> {
    let mut valid = Vec::new();
    for handle in handles {
        match validate(&handle).await {
            Validation::Ok => {
                tracing::info!(handle = %handle.display_name(), "credentials validated");
                valid.push(handle);
            }
            Validation::Mismatch { reported } => {
                tracing::error!(
                    handle = %handle.display_name(),
                    expected = %handle.account_id,
                    reported = %reported,
                    "account id mismatch, excluding handle"
                );
            }
            Validation::Unreachable { reason } => {
                tracing::error!(
                    handle = %handle.display_name(),
                    reason = %reason,
                    "credential validation unreachable, excluding handle"
                );
            }
        }
    }

    if valid.is_empty() {
        return Err(EngineError::NoValidCredentials);
    }
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts_config(json: &str) -> AccountsConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn root_handles_cross_accounts_with_regions() {
        let config = accounts_config(
            r#"{
                "accounts": {
                    "account01": {"account_id": "111111111111", "email": "a@x.com", "access_key": "AK1", "secret_key": "S1"},
                    "account02": {"account_id": "222222222222", "email": "b@x.com", "access_key": "AK2", "secret_key": "S2"}
                },
                "user_settings": {"user_regions": ["us-east-1", "us-west-2", "ap-south-1"]}
            }"#,
        );

        let handles = root_handles(&config, "all", "1,3").unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].regions, ["us-east-1", "ap-south-1"]);
        assert_eq!(handles[0].kind, CredentialKind::Root);
        assert!(handles[0].username.is_none());
    }

    #[test]
    fn iam_handles_are_one_per_user() {
        let file: IamCredentialsFile = serde_json::from_str(
            r#"{
                "accounts": {
                    "account03": {
                        "account_id": "333333333333",
                        "users": [
                            {"username": "account03_clouduser01", "region": "us-east-1",
                             "access_key_id": "AKU1", "secret_access_key": "SU1"},
                            {"username": "account03_clouduser02", "region": "us-west-2",
                             "access_key_id": "AKU2", "secret_access_key": "SU2"}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        let handles = iam_handles(&file, "").unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].kind, CredentialKind::Iam);
        assert_eq!(handles[1].regions, ["us-west-2"]);
        assert_eq!(
            handles[0].display_name(),
            "account03/account03_clouduser01"
        );
    }

    #[test]
    fn bad_selection_is_rejected() {
        let config = accounts_config(
            r#"{
                "accounts": {
                    "account01": {"account_id": "1", "email": "a@x.com", "access_key": "AK1", "secret_key": "S1"}
                },
                "user_settings": {"user_regions": ["us-east-1"]}
            }"#,
        );
        assert!(root_handles(&config, "2", "all").is_err());
        assert!(root_handles(&config, "all", "0").is_err());
    }
}
