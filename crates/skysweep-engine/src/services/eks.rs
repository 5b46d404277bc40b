//! EKS workers: autoscaler teardown and aws-auth configuration.
//!
//! Auth handling follows the cluster's authentication mode: API-capable
//! modes get access entries, ConfigMap-capable modes get the aws-auth
//! ConfigMap, and `API_AND_CONFIG_MAP` gets both.

use std::sync::Arc;

use aws_sdk_eks::types::AuthenticationMode;
use skysweep_core::{LedgerEntry, ResourceType, Task, TaskKind};

use crate::authmap;
use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::kube::Kubectl;
use crate::retry::aws_code_and_msg;
use crate::sdk;
use crate::services::new_ref;

async fn client(task: &Task) -> aws_sdk_eks::Client {
    let config = sdk::sdk_config(&task.handle, &task.region).await;
    aws_sdk_eks::Client::new(&config)
}

/// EKS cleanup enumerates clusters and removes their autoscalers.
pub async fn discover(
    _ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<Vec<FollowUp>, EngineError> {
    let eks = client(task).await;

    let mut follow_ups = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let mut request = eks.list_clusters();
        if let Some(token) = &next_token {
            request = request.next_token(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        for cluster in response.clusters() {
            follow_ups.push(FollowUp::new(TaskKind::DeleteEksAutoscaler {
                cluster: cluster.clone(),
            }));
        }

        next_token = response.next_token().map(String::from);
        if next_token.as_deref().is_none_or(str::is_empty) {
            break;
        }
    }
    Ok(follow_ups)
}

pub async fn delete_autoscaler(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    cluster: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::EksAutoscaler, cluster);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::retired(reference))?;
        return Ok(());
    }

    let kubectl = Kubectl::for_handle(&task.handle, &task.region, ctx.kube_deadline);
    kubectl.update_kubeconfig(cluster).await?;
    kubectl.verify_connectivity().await?;
    kubectl.delete_autoscaler_objects().await?;

    ctx.ledger.append(LedgerEntry::retired(reference))?;
    tracing::info!(cluster, "cluster autoscaler removed");
    Ok(())
}

pub async fn configure_auth(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    cluster: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::EksAuthMapping, cluster);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::created(reference))?;
        return Ok(());
    }

    let eks = client(task).await;
    let described = eks
        .describe_cluster()
        .name(cluster)
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    let mode = described
        .cluster()
        .and_then(|c| c.access_config())
        .and_then(|a| a.authentication_mode())
        .cloned()
        .unwrap_or(AuthenticationMode::ConfigMap);

    let users = authmap::auth_map_users(cluster, &task.handle.account_id)?;

    let api_capable = matches!(
        mode,
        AuthenticationMode::Api | AuthenticationMode::ApiAndConfigMap
    );
    let configmap_capable = matches!(
        mode,
        AuthenticationMode::ConfigMap | AuthenticationMode::ApiAndConfigMap
    );

    if api_capable {
        for arn in authmap::access_entry_arns(cluster, &task.handle.account_id)? {
            match eks
                .create_access_entry()
                .cluster_name(cluster)
                .principal_arn(&arn)
                .send()
                .await
            {
                Ok(_) => tracing::info!(cluster, principal = %arn, "access entry created"),
                Err(e) => {
                    let (code, msg) = aws_code_and_msg(&e);
                    // An existing entry is exactly what we want.
                    if code == "ResourceInUseException" {
                        tracing::debug!(cluster, principal = %arn, "access entry already present");
                    } else {
                        return Err(EngineError::Aws(msg));
                    }
                }
            }
        }
    }

    let mut strategy = "access-entries-only";
    if configmap_capable {
        let manifest = authmap::render_configmap(&users, &[])?;
        let kubectl = Kubectl::for_handle(&task.handle, &task.region, ctx.kube_deadline);
        kubectl.update_kubeconfig(cluster).await?;
        kubectl.verify_connectivity().await?;
        strategy = kubectl.apply_configmap(&manifest).await?;

        let applied = kubectl.read_map_users().await?;
        for user in &users {
            if !applied.contains(user.userarn.as_str()) {
                return Err(EngineError::Kube(format!(
                    "aws-auth verification: {} missing from mapUsers",
                    user.userarn
                )));
            }
        }
    }

    reference = reference
        .with_metadata("auth_mode", serde_json::json!(mode.as_str()))
        .with_metadata("strategy", serde_json::json!(strategy))
        .with_metadata("principals", serde_json::json!(users.len()));
    ctx.ledger.append(LedgerEntry::created(reference))?;
    tracing::info!(cluster, strategy, "aws-auth configured");
    Ok(())
}
