//! Storage Gateway cleanup: gateways by ARN.

use std::sync::Arc;

use aws_sdk_storagegateway::Client;
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
    let gateway = client(task).await;

    let mut follow_ups = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let mut request = gateway.list_gateways();
        if let Some(m) = &marker {
            request = request.marker(m);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;

        for info in response.gateways() {
            if let Some(arn) = info.gateway_arn() {
                follow_ups.push(FollowUp::new(TaskKind::DeleteStorageGateway {
                    gateway_arn: arn.to_string(),
                }));
            }
        }

        marker = response.marker().map(String::from);
        if marker.as_deref().is_none_or(str::is_empty) {
            break;
        }
    }
    Ok(follow_ups)
}

pub async fn delete_gateway(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    gateway_arn: &str,
) -> Result<(), EngineError> {
    let gateway = client(task).await;
    simple_delete(
        ctx,
        task,
        ResourceType::GatewayStorage,
        gateway_arn,
        "delete-storage-gateway",
        || async {
            gateway
                .delete_gateway()
                .gateway_arn(gateway_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        },
    )
    .await
}
