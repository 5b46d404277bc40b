//! EC2 cleanup: instance termination and security-group deletion with the
//! dependency dance between them.
//!
//! Discovery correlates instances to their security groups so the planner's
//! edge rule (instances terminate before their groups delete) holds. The
//! default security group is never deleted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_ec2::types::Filter;
use aws_sdk_ec2::Client;
use skysweep_core::{LedgerEntry, ResourceType, Task, TaskKind};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::retry::{aws_code_and_msg, retry_aws, AwsOp};
use crate::sdk;
use crate::services::new_ref;

const TERMINATION_POLL_INTERVAL: Duration = Duration::from_secs(10);
const TERMINATION_POLL_LIMIT: u32 = 30;
/// Wait before the first forced delete retry, matching the window AWS needs
/// to detach ENIs from a terminating instance.
const DEPENDENCY_RETRY_DELAY: Duration = Duration::from_secs(30);
const DELETE_SG_ATTEMPTS: u32 = 5;

pub(crate) async fn client(task: &Task) -> Client {
    let config = sdk::sdk_config(&task.handle, &task.region).await;
    Client::new(&config)
}

/// Enumerate instances and security groups, correlating them so deletes are
/// ordered: terminate instances → clear rules → delete group.
pub async fn discover(
    _ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<Vec<FollowUp>, EngineError> {
    let ec2 = client(task).await;

    // Live instances only; terminated ones are gone already.
    let mut instances: Vec<(String, Vec<String>)> = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let mut request = ec2.describe_instances().filters(
            Filter::builder()
                .name("instance-state-name")
                .values("pending")
                .values("running")
                .values("stopping")
                .values("stopped")
                .build(),
        );
        if let Some(token) = &next_token {
            request = request.next_token(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        for reservation in response.reservations() {
            for instance in reservation.instances() {
                let Some(id) = instance.instance_id() else {
                    continue;
                };
                let groups: Vec<String> = instance
                    .security_groups()
                    .iter()
                    .filter_map(|g| g.group_id().map(String::from))
                    .collect();
                instances.push((id.to_string(), groups));
            }
        }

        next_token = response.next_token().map(String::from);
        if next_token.as_deref().is_none_or(str::is_empty) {
            break;
        }
    }

    let mut groups: Vec<(String, String)> = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let mut request = ec2.describe_security_groups();
        if let Some(token) = &next_token {
            request = request.next_token(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        for group in response.security_groups() {
            let (Some(id), Some(name)) = (group.group_id(), group.group_name()) else {
                continue;
            };
            if name == "default" {
                continue;
            }
            groups.push((id.to_string(), name.to_string()));
        }

        next_token = response.next_token().map(String::from);
        if next_token.as_deref().is_none_or(str::is_empty) {
            break;
        }
    }

    // Terminations first, then per group: clear rules, then delete, with the
    // delete gated on every attached instance being gone.
    let mut follow_ups = Vec::new();
    let mut instance_index: HashMap<String, Vec<usize>> = HashMap::new();
    for (instance_id, group_ids) in &instances {
        let index = follow_ups.len();
        follow_ups.push(FollowUp::new(TaskKind::TerminateInstance {
            instance_id: instance_id.clone(),
            security_groups: group_ids.clone(),
        }));
        for group_id in group_ids {
            instance_index.entry(group_id.clone()).or_default().push(index);
        }
    }

    for (group_id, group_name) in groups {
        let attached = instance_index.get(&group_id).cloned().unwrap_or_default();
        let mut clear = FollowUp::new(TaskKind::ClearSecurityGroupRules {
            group_id: group_id.clone(),
        });
        for index in &attached {
            clear = clear.after(*index);
        }
        let clear_index = follow_ups.len();
        follow_ups.push(clear);

        follow_ups.push(
            FollowUp::new(TaskKind::DeleteSecurityGroup {
                group_id,
                group_name,
            })
            .after(clear_index),
        );
    }

    Ok(follow_ups)
}

pub async fn terminate_instance(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    instance_id: &str,
    _security_groups: &[String],
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::Instance, instance_id);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::retired(reference))?;
        return Ok(());
    }

    let ec2 = client(task).await;
    let op = retry_aws("terminate-instance", &ctx.cancel, || async {
        ec2.terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| aws_code_and_msg(&e))
    })
    .await?;

    match op {
        AwsOp::AlreadyGone => {
            ctx.ledger
                .append(LedgerEntry::retired_already_absent(reference))?;
            return Ok(());
        }
        AwsOp::Done(()) => {}
    }

    wait_for_termination(ctx, &ec2, instance_id).await?;
    ctx.ledger.append(LedgerEntry::retired(reference))?;
    Ok(())
}

/// Poll until the instance reports `terminated`. Bounded; the task deadline
/// is the real backstop.
async fn wait_for_termination(
    ctx: &Arc<WorkerContext>,
    ec2: &Client,
    instance_id: &str,
) -> Result<(), EngineError> {
    for _ in 0..TERMINATION_POLL_LIMIT {
        if ctx.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let response = ec2
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await;
        match response {
            Ok(r) => {
                let state = r
                    .reservations()
                    .iter()
                    .flat_map(|res| res.instances())
                    .filter_map(|i| i.state().and_then(|s| s.name()))
                    .next();
                match state {
                    None => return Ok(()), // no longer described at all
                    Some(name) if name.as_str() == "terminated" => return Ok(()),
                    Some(name) => {
                        tracing::debug!(instance = instance_id, state = %name, "awaiting termination");
                    }
                }
            }
            Err(e) => {
                let (code, _) = aws_code_and_msg(&e);
                if code == "InvalidInstanceID.NotFound" {
                    return Ok(());
                }
            }
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = tokio::time::sleep(TERMINATION_POLL_INTERVAL) => {}
        }
    }
    Err(EngineError::Timeout {
        what: format!("termination of {instance_id}"),
    })
}

/// Revoke all ingress rules and all non-default egress rules.
///
/// The stock allow-all egress rule survives; removing it breaks nothing but
/// recreating groups later gets confusing for operators.
pub async fn clear_security_group_rules(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    group_id: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::SecurityGroup, group_id);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::cleared(reference))?;
        return Ok(());
    }

    let ec2 = client(task).await;
    let cleared = clear_rules_once(ctx, &ec2, group_id).await?;

    reference = reference.with_metadata("rules_cleared", serde_json::json!(cleared));
    ctx.ledger.append(LedgerEntry::cleared(reference))?;
    Ok(())
}

async fn clear_rules_once(
    ctx: &Arc<WorkerContext>,
    ec2: &Client,
    group_id: &str,
) -> Result<usize, EngineError> {
    let response = ec2
        .describe_security_groups()
        .group_ids(group_id)
        .send()
        .await;
    let response = match response {
        Ok(r) => r,
        Err(e) => {
            let (code, msg) = aws_code_and_msg(&e);
            if skysweep_core::classify_aws_error(&code)
                == skysweep_core::ErrorDisposition::AlreadyGone
            {
                return Ok(0);
            }
            return Err(EngineError::Aws(msg));
        }
    };
    let Some(group) = response.security_groups().first() else {
        return Ok(0);
    };

    let mut cleared = 0usize;

    let ingress = group.ip_permissions().to_vec();
    if !ingress.is_empty() {
        cleared += ingress.len();
        let result = retry_aws("revoke-ingress", &ctx.cancel, || {
            let permissions = ingress.clone();
            async {
                ec2.revoke_security_group_ingress()
                    .group_id(group_id)
                    .set_ip_permissions(Some(permissions))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| aws_code_and_msg(&e))
            }
        })
        .await?;
        if matches!(result, AwsOp::AlreadyGone) {
            return Ok(0);
        }
    }

    // Egress rules go one at a time: a single bad rule must not block the
    // rest, and the default allow-all rule stays.
    for rule in group.ip_permissions_egress() {
        let is_default_egress = rule.ip_protocol() == Some("-1")
            && rule
                .ip_ranges()
                .iter()
                .any(|r| r.cidr_ip() == Some("0.0.0.0/0"));
        if is_default_egress {
            continue;
        }

        let outcome = retry_aws("revoke-egress", &ctx.cancel, || {
            let rule = rule.clone();
            async {
                ec2.revoke_security_group_egress()
                    .group_id(group_id)
                    .ip_permissions(rule)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| aws_code_and_msg(&e))
            }
        })
        .await;
        match outcome {
            Ok(_) => cleared += 1,
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => tracing::warn!(group = group_id, error = %e, "egress rule not revoked"),
        }
    }

    Ok(cleared)
}

/// Delete a security group, forcing its way through `DependencyViolation`:
/// wait, terminate attached instances, clear rules, retry.
pub async fn delete_security_group(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    group_id: &str,
    group_name: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::SecurityGroup, group_id)
        .with_metadata("group_name", serde_json::json!(group_name));
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::retired(reference))?;
        return Ok(());
    }

    let ec2 = client(task).await;
    for attempt in 0..DELETE_SG_ATTEMPTS {
        if ctx.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        match ec2
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
        {
            Ok(_) => {
                ctx.ledger.append(LedgerEntry::retired(reference))?;
                return Ok(());
            }
            Err(e) => {
                let (code, msg) = aws_code_and_msg(&e);
                match skysweep_core::classify_aws_error(&code) {
                    skysweep_core::ErrorDisposition::AlreadyGone => {
                        ctx.ledger
                            .append(LedgerEntry::retired_already_absent(reference))?;
                        return Ok(());
                    }
                    skysweep_core::ErrorDisposition::RetryAfterUnblock => {
                        tracing::warn!(
                            group = group_id,
                            attempt,
                            "security group still referenced, forcing"
                        );
                        tokio::select! {
                            _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
                            _ = tokio::time::sleep(DEPENDENCY_RETRY_DELAY) => {}
                        }
                        force_detach(ctx, task, &ec2, group_id).await?;
                    }
                    skysweep_core::ErrorDisposition::Retry => {
                        crate::retry::sleep_backoff(&ctx.cancel, attempt).await?;
                    }
                    skysweep_core::ErrorDisposition::Fail => {
                        ctx.ledger
                            .append(LedgerEntry::failed(reference, code.as_str()))?;
                        return Err(EngineError::Aws(msg));
                    }
                }
            }
        }
    }

    ctx.ledger
        .append(LedgerEntry::failed(reference, "DependencyViolation"))?;
    Err(EngineError::Aws(format!(
        "delete-security-group {group_id}: retries exhausted"
    )))
}

/// Terminate whatever still references the group, then clear its rules.
async fn force_detach(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    ec2: &Client,
    group_id: &str,
) -> Result<(), EngineError> {
    let response = ec2
        .describe_instances()
        .filters(
            Filter::builder()
                .name("instance.group-id")
                .values(group_id)
                .build(),
        )
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

    for reservation in response.reservations() {
        for instance in reservation.instances() {
            let Some(instance_id) = instance.instance_id() else {
                continue;
            };
            let state = instance
                .state()
                .and_then(|s| s.name())
                .map(|n| n.as_str().to_string())
                .unwrap_or_default();
            if state == "terminated" || state == "shutting-down" {
                continue;
            }
            tracing::info!(group = group_id, instance = instance_id, "terminating holdout instance");
            terminate_instance(ctx, task, instance_id, &[]).await?;
        }
    }

    clear_rules_once(ctx, ec2, group_id).await?;
    Ok(())
}
