//! SageMaker cleanup: notebooks (stopped before deletion), endpoints,
//! endpoint configs, and models.

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_sagemaker::types::NotebookInstanceStatus;
use aws_sdk_sagemaker::Client;
use skysweep_core::{LedgerEntry, ResourceType, Task, TaskKind};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::retry::{aws_code_and_msg, retry_aws, AwsOp};
use crate::sdk;
use crate::services::{new_ref, simple_delete};

const STOP_POLL_INTERVAL: Duration = Duration::from_secs(15);
const STOP_POLL_LIMIT: u32 = 40;

async fn client(task: &Task) -> Client {
    let config = sdk::sdk_config(&task.handle, &task.region).await;
    Client::new(&config)
}

pub async fn discover(
    _ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<Vec<FollowUp>, EngineError> {
    let sagemaker = client(task).await;

    let mut follow_ups = Vec::new();

    let notebooks = sagemaker
        .list_notebook_instances()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    for notebook in notebooks.notebook_instances() {
        let Some(name) = notebook.notebook_instance_name() else {
            continue;
        };
        let in_service = notebook.notebook_instance_status()
            == Some(&NotebookInstanceStatus::InService);

        if in_service {
            let stop_index = follow_ups.len();
            follow_ups.push(FollowUp::new(TaskKind::StopNotebook {
                name: name.to_string(),
            }));
            follow_ups.push(
                FollowUp::new(TaskKind::DeleteNotebook {
                    name: name.to_string(),
                })
                .after(stop_index),
            );
        } else {
            follow_ups.push(FollowUp::new(TaskKind::DeleteNotebook {
                name: name.to_string(),
            }));
        }
    }

    let endpoints = sagemaker
        .list_endpoints()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    for endpoint in endpoints.endpoints() {
        if let Some(name) = endpoint.endpoint_name() {
            follow_ups.push(FollowUp::new(TaskKind::DeleteSagemakerEndpoint {
                name: name.to_string(),
            }));
        }
    }

    let configs = sagemaker
        .list_endpoint_configs()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    for config in configs.endpoint_configs() {
        if let Some(name) = config.endpoint_config_name() {
            follow_ups.push(FollowUp::new(TaskKind::DeleteSagemakerEndpointConfig {
                name: name.to_string(),
            }));
        }
    }

    let models = sagemaker
        .list_models()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    for model in models.models() {
        if let Some(name) = model.model_name() {
            follow_ups.push(FollowUp::new(TaskKind::DeleteSagemakerModel {
                name: name.to_string(),
            }));
        }
    }

    Ok(follow_ups)
}

pub async fn stop_notebook(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    name: &str,
) -> Result<(), EngineError> {
    let mut reference = new_ref(ctx, task, ResourceType::NotebookInstance, name);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::cleared(reference))?;
        return Ok(());
    }

    let sagemaker = client(task).await;
    let result = retry_aws("stop-notebook", &ctx.cancel, || async {
        sagemaker
            .stop_notebook_instance()
            .notebook_instance_name(name)
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

    // The delete API rejects anything not yet Stopped.
    for _ in 0..STOP_POLL_LIMIT {
        if ctx.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let described = sagemaker
            .describe_notebook_instance()
            .notebook_instance_name(name)
            .send()
            .await;
        match described {
            Ok(d) => match d.notebook_instance_status() {
                Some(NotebookInstanceStatus::Stopped) | Some(NotebookInstanceStatus::Failed) => {
                    ctx.ledger.append(LedgerEntry::cleared(reference))?;
                    return Ok(());
                }
                status => {
                    tracing::debug!(notebook = name, status = ?status, "awaiting notebook stop");
                }
            },
            Err(e) => {
                let (code, _) = aws_code_and_msg(&e);
                if skysweep_core::classify_aws_error(&code)
                    == skysweep_core::ErrorDisposition::AlreadyGone
                {
                    ctx.ledger
                        .append(LedgerEntry::retired_already_absent(reference))?;
                    return Ok(());
                }
            }
        }
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = tokio::time::sleep(STOP_POLL_INTERVAL) => {}
        }
    }
    Err(EngineError::Timeout {
        what: format!("stop of notebook {name}"),
    })
}

pub async fn delete_notebook(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    name: &str,
) -> Result<(), EngineError> {
    let sagemaker = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::NotebookInstance,
        name,
        "delete-notebook",
        || async {
            sagemaker
                .delete_notebook_instance()
                .notebook_instance_name(name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}

pub async fn delete_endpoint(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    name: &str,
) -> Result<(), EngineError> {
    let sagemaker = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::SagemakerEndpoint,
        name,
        "delete-endpoint",
        || async {
            sagemaker
                .delete_endpoint()
                .endpoint_name(name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}

pub async fn delete_endpoint_config(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    name: &str,
) -> Result<(), EngineError> {
    let sagemaker = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::SagemakerEndpointConfig,
        name,
        "delete-endpoint-config",
        || async {
            sagemaker
                .delete_endpoint_config()
                .endpoint_config_name(name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}

pub async fn delete_model(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    name: &str,
) -> Result<(), EngineError> {
    let sagemaker = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::SagemakerModel,
        name,
        "delete-model",
        || async {
            sagemaker
                .delete_model()
                .model_name(name)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}
