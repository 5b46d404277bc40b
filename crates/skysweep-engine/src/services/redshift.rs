//! Redshift cleanup: clusters first (skip-final-snapshot), then subnet
//! groups and parameter groups once nothing references them. Default
//! parameter groups cannot be deleted and are left alone.

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_redshift::Client;
use skysweep_core::{LedgerEntry, ResourceType, Task, TaskKind};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::retry::{aws_code_and_msg, retry_aws, AwsOp};
use crate::sdk;
use crate::services::{new_ref, simple_delete};

const DELETION_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DELETION_POLL_LIMIT: u32 = 24;

async fn client(task: &Task) -> Client {
    let config = sdk::sdk_config(&task.handle, &task.region).await;
    Client::new(&config)
}

pub async fn discover(
    _ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<Vec<FollowUp>, EngineError> {
    let redshift = client(task).await;

    let mut follow_ups = Vec::new();

    let clusters = redshift
        .describe_clusters()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    let mut cluster_indices = Vec::new();
    for cluster in clusters.clusters() {
        if let Some(id) = cluster.cluster_identifier() {
            cluster_indices.push(follow_ups.len());
            follow_ups.push(FollowUp::new(TaskKind::DeleteRedshiftCluster {
                cluster_id: id.to_string(),
            }));
        }
    }

    let subnet_groups = redshift
        .describe_cluster_subnet_groups()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    for group in subnet_groups.cluster_subnet_groups() {
        let Some(name) = group.cluster_subnet_group_name() else {
            continue;
        };
        if name.starts_with("default") {
            continue;
        }
        let mut follow_up = FollowUp::new(TaskKind::DeleteRedshiftSubnetGroup {
            name: name.to_string(),
        });
        for index in &cluster_indices {
            follow_up = follow_up.after(*index);
        }
        follow_ups.push(follow_up);
    }

    let parameter_groups = redshift
        .describe_cluster_parameter_groups()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    for group in parameter_groups.parameter_groups() {
        let Some(name) = group.parameter_group_name() else {
            continue;
        };
        if name.starts_with("default") {
            continue;
        }
        let mut follow_up = FollowUp::new(TaskKind::DeleteRedshiftParameterGroup {
            name: name.to_string(),
        });
        for index in &cluster_indices {
            follow_up = follow_up.after(*index);
        }
        follow_ups.push(follow_up);
    }

    let actions = redshift
        .describe_scheduled_actions()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    for action in actions.scheduled_actions() {
        if let Some(name) = action.scheduled_action_name() {
            follow_ups.push(FollowUp::new(TaskKind::DeleteRedshiftScheduledAction {
                name: name.to_string(),
            }));
        }
    }

    Ok(follow_ups)
}

pub async fn delete_cluster(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    cluster_id: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::RedshiftCluster, cluster_id);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::retired(reference))?;
        return Ok(());
    }

    let redshift = client(task).await;
    let result = retry_aws("delete-redshift-cluster", &ctx.cancel, || async {
        redshift
            .delete_cluster()
            .cluster_identifier(cluster_id)
            .skip_final_cluster_snapshot(true)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| aws_code_and_msg(&e))
    })
    .await?;

    if matches!(result, AwsOp::AlreadyGone) {
        ctx.ledger
            .append(LedgerEntry::retired_already_absent(reference))?;
        return Ok(());
    }

    // Subnet and parameter groups cannot go while the cluster is draining.
    wait_for_cluster_gone(ctx, &redshift, cluster_id).await?;
    ctx.ledger.append(LedgerEntry::retired(reference))?;
    Ok(())
}

async fn wait_for_cluster_gone(
    ctx: &Arc<WorkerContext>,
    redshift: &Client,
    cluster_id: &str,
) -> Result<(), EngineError> {
    for _ in 0..DELETION_POLL_LIMIT {
        if ctx.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match redshift
            .describe_clusters()
            .cluster_identifier(cluster_id)
            .send()
            .await
        {
            Ok(response) => {
                if response.clusters().is_empty() {
                    return Ok(());
                }
                tracing::debug!(cluster = cluster_id, "awaiting redshift cluster deletion");
            }
            Err(e) => {
                let (code, _) = aws_code_and_msg(&e);
                if skysweep_core::classify_aws_error(&code)
                    == skysweep_core::ErrorDisposition::AlreadyGone
                {
                    return Ok(());
                }
            }
        }
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = tokio::time::sleep(DELETION_POLL_INTERVAL) => {}
        }
    }
    Err(EngineError::Timeout {
        what: format!("deletion of redshift cluster {cluster_id}"),
    })
}

pub async fn delete_subnet_group(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    name: &str,
) -> Result<(), EngineError> {
    let redshift = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::RedshiftSubnetGroup,
        name,
        "delete-redshift-subnet-group",
        || async {
            redshift
                .delete_cluster_subnet_group()
                .cluster_subnet_group_name(name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}

pub async fn delete_parameter_group(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    name: &str,
) -> Result<(), EngineError> {
    let redshift = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::RedshiftParameterGroup,
        name,
        "delete-redshift-parameter-group",
        || async {
            redshift
                .delete_cluster_parameter_group()
                .parameter_group_name(name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}

pub async fn delete_scheduled_action(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    name: &str,
) -> Result<(), EngineError> {
    let redshift = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::RedshiftScheduledAction,
        name,
        "delete-redshift-scheduled-action",
        || async {
            redshift
                .delete_scheduled_action()
                .scheduled_action_name(name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}
