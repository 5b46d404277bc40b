//! FSx cleanup: file systems, no final backup.

use std::sync::Arc;

use aws_sdk_fsx::Client;
use skysweep_core::{ResourceType, Task, TaskKind};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;
use crate::retry::aws_code_and_msg;
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
    let fsx = client(task).await;

    let mut follow_ups = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let mut request = fsx.describe_file_systems();
        if let Some(token) = &next_token {
            request = request.next_token(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        for file_system in response.file_systems() {
            if let Some(id) = file_system.file_system_id() {
                follow_ups.push(FollowUp::new(TaskKind::DeleteFsxFileSystem {
                    file_system_id: id.to_string(),
                }));
            }
        }

        next_token = response.next_token().map(String::from);
        if next_token.as_deref().is_none_or(str::is_empty) {
            break;
        }
    }
    Ok(follow_ups)
}

pub async fn delete_file_system(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    file_system_id: &str,
) -> Result<(), EngineError> {
    let fsx = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::FsxFileSystem,
        file_system_id,
        "delete-fsx-file-system",
        || async {
            fsx.delete_file_system()
                .file_system_id(file_system_id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}
