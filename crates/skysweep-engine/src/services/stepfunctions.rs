//! Step Functions cleanup: running executions are stopped before the state
//! machine is deleted, otherwise the delete hangs in `DELETING` for hours.

use std::sync::Arc;

use aws_sdk_sfn::types::ExecutionStatus;
use aws_sdk_sfn::Client;
use skysweep_core::{ResourceType, Task, TaskKind};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::retry::{aws_code_and_msg, retry_aws};
use crate::sdk;
use crate::services::simple_delete;

async fn client(task: &Task) -> Client {
    let config = sdk::sdk_config(&task.handle, &task.region).await;
    Client::new(&config)
}

pub async fn discover(
    _ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<Vec<FollowUp>, EngineError> {
    let sfn = client(task).await;

    let mut follow_ups = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let mut request = sfn.list_state_machines();
        if let Some(token) = &next_token {
            request = request.next_token(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        for machine in response.state_machines() {
            follow_ups.push(FollowUp::new(TaskKind::DeleteStateMachine {
                arn: machine.state_machine_arn().to_string(),
            }));
        }

        next_token = response.next_token().map(String::from);
        if next_token.as_deref().is_none_or(str::is_empty) {
            break;
        }
    }
    Ok(follow_ups)
}

pub async fn delete_state_machine(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    arn: &str,
) -> Result<(), EngineError> {
    let sfn = client(task).await;

    if !ctx.dry_run {
        stop_running_executions(ctx, &sfn, arn).await?;
    }

    simple_delete(
        ctx,
        task,
        ResourceType::StateMachine,
        arn,
        "delete-state-machine",
        || async {
            sfn.delete_state_machine()
                .state_machine_arn(arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}

async fn stop_running_executions(
    ctx: &Arc<WorkerContext>,
    sfn: &Client,
    arn: &str,
) -> Result<(), EngineError> {
    let executions = match sfn
        .list_executions()
        .state_machine_arn(arn)
        .status_filter(ExecutionStatus::Running)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            let (code, msg) = aws_code_and_msg(&e);
            if skysweep_core::classify_aws_error(&code)
                == skysweep_core::ErrorDisposition::AlreadyGone
            {
                return Ok(());
            }
            return Err(EngineError::Aws(msg));
        }
    };

    for execution in executions.executions() {
        let execution_arn = execution.execution_arn();
        retry_aws("stop-execution", &ctx.cancel, || async {
            sfn.stop_execution()
                .execution_arn(execution_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        })
        .await?;
        tracing::info!(execution = execution_arn, "running execution stopped");
    }
    Ok(())
}
