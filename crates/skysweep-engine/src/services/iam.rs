//! IAM cleanup for automation-created users and groups.
//!
//! Only principals matching the generated naming scheme
//! (`account03_clouduser01` and the matching group names) are touched.
//! IAM is a global service; the handle's first region claims the work so
//! multi-region sessions do not double-delete.

use std::sync::Arc;
use std::sync::LazyLock;

use aws_sdk_iam::Client;
use regex::Regex;
use skysweep_core::{LedgerEntry, ResourceType, Task, TaskKind};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::retry::{aws_code_and_msg, retry_aws, AwsOp};
use crate::sdk;
use crate::services::new_ref;

static GENERATED_USER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^account\d+_clouduser\d+$").expect("valid regex"));
static GENERATED_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^account\d+_(cloud)?group").expect("valid regex"));

async fn client(task: &Task) -> Client {
    let config = sdk::sdk_config(&task.handle, &task.region).await;
    Client::new(&config)
}

pub async fn discover(
    _ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<Vec<FollowUp>, EngineError> {
    if task.handle.regions.first().map(String::as_str) != Some(task.region.as_str()) {
        tracing::debug!(region = %task.region, "IAM is global, handled by the first region");
        return Ok(Vec::new());
    }

    let iam = client(task).await;
    let mut follow_ups = Vec::new();

    let mut marker: Option<String> = None;
    loop {
        let mut request = iam.list_users();
        if let Some(m) = &marker {
            request = request.marker(m);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        for user in response.users() {
            let name = user.user_name();
            if GENERATED_USER.is_match(name) {
                follow_ups.push(FollowUp::new(TaskKind::DeleteIamUser {
                    username: name.to_string(),
                }));
            }
        }

        if response.is_truncated() {
            marker = response.marker().map(String::from);
        } else {
            break;
        }
    }

    let mut marker: Option<String> = None;
    loop {
        let mut request = iam.list_groups();
        if let Some(m) = &marker {
            request = request.marker(m);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        for group in response.groups() {
            let name = group.group_name();
            if GENERATED_GROUP.is_match(name) {
                follow_ups.push(FollowUp::new(TaskKind::DeleteIamGroup {
                    group: name.to_string(),
                }));
            }
        }

        if response.is_truncated() {
            marker = response.marker().map(String::from);
        } else {
            break;
        }
    }

    Ok(follow_ups)
}

/// Delete a user after stripping everything AWS requires to be gone first:
/// attached policies, inline policies, group memberships, access keys, and
/// the console login profile.
pub async fn delete_user(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    username: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::IamUser, username);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::retired(reference))?;
        return Ok(());
    }

    let iam = client(task).await;

    let attached = iam
        .list_attached_user_policies()
        .user_name(username)
        .send()
        .await;
    if let Ok(attached) = attached {
        for policy in attached.attached_policies() {
            if let Some(arn) = policy.policy_arn() {
                retry_aws("detach-user-policy", &ctx.cancel, || async {
                    iam.detach_user_policy()
                        .user_name(username)
                        .policy_arn(arn)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|e| aws_code_and_msg(&e))
                })
                .await?;
            }
        }
    }

    if let Ok(inline) = iam.list_user_policies().user_name(username).send().await {
        for policy_name in inline.policy_names() {
            retry_aws("delete-user-policy", &ctx.cancel, || async {
                iam.delete_user_policy()
                    .user_name(username)
                    .policy_name(policy_name)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| aws_code_and_msg(&e))
            })
            .await?;
        }
    }

    if let Ok(groups) = iam.list_groups_for_user().user_name(username).send().await {
        for group in groups.groups() {
            let group_name = group.group_name();
            retry_aws("remove-user-from-group", &ctx.cancel, || async {
                iam.remove_user_from_group()
                    .user_name(username)
                    .group_name(group_name)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| aws_code_and_msg(&e))
            })
            .await?;
        }
    }

    if let Ok(keys) = iam.list_access_keys().user_name(username).send().await {
        for key in keys.access_key_metadata() {
            if let Some(key_id) = key.access_key_id() {
                retry_aws("delete-access-key", &ctx.cancel, || async {
                    iam.delete_access_key()
                        .user_name(username)
                        .access_key_id(key_id)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|e| aws_code_and_msg(&e))
                })
                .await?;
            }
        }
    }

    retry_aws("delete-login-profile", &ctx.cancel, || async {
        iam.delete_login_profile()
            .user_name(username)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| aws_code_and_msg(&e))
    })
    .await?;

    let result = retry_aws("delete-user", &ctx.cancel, || async {
        iam.delete_user()
            .user_name(username)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| aws_code_and_msg(&e))
    })
    .await?;

    match result {
        AwsOp::Done(()) => ctx.ledger.append(LedgerEntry::retired(reference))?,
        AwsOp::AlreadyGone => ctx
            .ledger
            .append(LedgerEntry::retired_already_absent(reference))?,
    }
    tracing::info!(user = username, "IAM user deleted");
    Ok(())
}

pub async fn delete_group(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    group: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::IamGroup, group);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::retired(reference))?;
        return Ok(());
    }

    let iam = client(task).await;

    if let Ok(attached) = iam
        .list_attached_group_policies()
        .group_name(group)
        .send()
        .await
    {
        for policy in attached.attached_policies() {
            if let Some(arn) = policy.policy_arn() {
                retry_aws("detach-group-policy", &ctx.cancel, || async {
                    iam.detach_group_policy()
                        .group_name(group)
                        .policy_arn(arn)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|e| aws_code_and_msg(&e))
                })
                .await?;
            }
        }
    }

    if let Ok(inline) = iam.list_group_policies().group_name(group).send().await {
        for policy_name in inline.policy_names() {
            retry_aws("delete-group-policy", &ctx.cancel, || async {
                iam.delete_group_policy()
                    .group_name(group)
                    .policy_name(policy_name)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| aws_code_and_msg(&e))
            })
            .await?;
        }
    }

    if let Ok(membership) = iam.get_group().group_name(group).send().await {
        for user in membership.users() {
            let username = user.user_name();
            retry_aws("remove-user-from-group", &ctx.cancel, || async {
                iam.remove_user_from_group()
                    .group_name(group)
                    .user_name(username)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| aws_code_and_msg(&e))
            })
            .await?;
        }
    }

    let result = retry_aws("delete-group", &ctx.cancel, || async {
        iam.delete_group()
            .group_name(group)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| aws_code_and_msg(&e))
    })
    .await?;

    match result {
        AwsOp::Done(()) => ctx.ledger.append(LedgerEntry::retired(reference))?,
        AwsOp::AlreadyGone => ctx
            .ledger
            .append(LedgerEntry::retired_already_absent(reference))?,
    }
    tracing::info!(group, "IAM group deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_user_pattern_matches_only_generated_names() {
        assert!(GENERATED_USER.is_match("account03_clouduser01"));
        assert!(GENERATED_USER.is_match("account10_clouduser12"));
        assert!(!GENERATED_USER.is_match("alice"));
        assert!(!GENERATED_USER.is_match("account03_clouduser01_extra"));
        assert!(!GENERATED_USER.is_match("clouduser01"));
    }
}
