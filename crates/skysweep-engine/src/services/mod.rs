//! Per-service AWS workers: discovery, deletion, and provisioning.

use std::sync::Arc;

use skysweep_core::task::Service;
use skysweep_core::{ResourceRef, ResourceType, Task};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::FollowUp;

pub mod ec2;
pub mod eks;
pub mod eventbridge;
pub mod fsx;
pub mod iam;
pub mod mq;
pub mod nuke_task;
pub mod provision;
pub mod redshift;
pub mod s3;
pub mod sagemaker;
pub mod stepfunctions;
pub mod storagegateway;

/// Route a discovery task to its service module.
pub async fn discover(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    service: Service,
) -> Result<Vec<FollowUp>, EngineError> {
    let follow_ups = match service {
        Service::Ec2 => ec2::discover(ctx, task).await?,
        Service::S3 => s3::discover(ctx, task).await?,
        Service::Eks => eks::discover(ctx, task).await?,
        Service::EventBridge => eventbridge::discover(ctx, task).await?,
        Service::Redshift => redshift::discover(ctx, task).await?,
        Service::StepFunctions => stepfunctions::discover(ctx, task).await?,
        Service::SageMaker => sagemaker::discover(ctx, task).await?,
        Service::Iam => iam::discover(ctx, task).await?,
        Service::Mq => mq::discover(ctx, task).await?,
        Service::Fsx => fsx::discover(ctx, task).await?,
        Service::StorageGateway => storagegateway::discover(ctx, task).await?,
    };
    tracing::info!(
        service = %service,
        account = %task.handle.account_name,
        region = %task.region,
        resources = follow_ups.len(),
        "discovery complete"
    );
    Ok(follow_ups)
}

/// Run a plain delete under the standard policy: dry-run writes a simulated
/// `retired` entry, a missing resource counts as already absent, success
/// writes a `retired` entry.
pub(crate) async fn simple_delete<Fut, Op>(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    resource_type: ResourceType,
    resource_id: &str,
    label: &str,
    op: Op,
) -> Result<(), EngineError>
where
    Op: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), (String, String)>>,
{
    let mut reference = new_ref(ctx, task, resource_type, resource_id);
    if ctx.dry_run {
        reference = reference.with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(skysweep_core::LedgerEntry::retired(reference))?;
        return Ok(());
    }

    match crate::retry::retry_aws(label, &ctx.cancel, op).await? {
        crate::retry::AwsOp::Done(()) => {
            ctx.ledger
                .append(skysweep_core::LedgerEntry::retired(reference))?;
        }
        crate::retry::AwsOp::AlreadyGone => {
            ctx.ledger
                .append(skysweep_core::LedgerEntry::retired_already_absent(
                    reference,
                ))?;
        }
    }
    Ok(())
}

/// Build a [`ResourceRef`] for a resource this task touched.
pub(crate) fn new_ref(
    ctx: &WorkerContext,
    task: &Task,
    resource_type: ResourceType,
    resource_id: &str,
) -> ResourceRef {
    ResourceRef {
        resource_id: resource_id.to_string(),
        resource_type,
        account_name: task.handle.account_name.clone(),
        account_id: task.handle.account_id.clone(),
        region: task.region.clone(),
        created_at: jiff::Timestamp::now(),
        session_id: ctx.session_id.clone(),
        metadata: Default::default(),
    }
}
