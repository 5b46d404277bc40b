//! Provisioning workers: EC2 instances and Auto Scaling Groups.
//!
//! Every created resource is tagged with the session id and recorded in the
//! ledger before the task reports success, so rollback can always find it.

use std::sync::Arc;

use aws_sdk_autoscaling::types::Tag as AsgTag;
use aws_sdk_ec2::types::{
    InstanceType, RequestLaunchTemplateData, ResourceType as Ec2TagResource, Tag as Ec2Tag,
    TagSpecification,
};
use skysweep_core::{LedgerEntry, ResourceType, Task};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::retry::{aws_code_and_msg, retry_aws, AwsOp};
use crate::sdk;
use crate::services::{ec2, new_ref};

const SESSION_TAG: &str = "AutomationSession";
const CREATOR_TAG: &str = "CreatedBy";

fn short_suffix() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    suffix[..8].to_string()
}

fn session_key_name(ctx: &WorkerContext) -> String {
    format!("skysweep-{}", ctx.session_id)
}

/// Create the session key pair in a region at most once per session.
///
/// Concurrent tasks in the same region serialize on the key-pair mutex, so
/// exactly one import attempt happens per region.
pub async fn ensure_key_pair(
    ctx: &Arc<WorkerContext>,
    task: &Task,
) -> Result<String, EngineError> {
    let key_name = session_key_name(ctx);
    if ctx.dry_run {
        return Ok(key_name);
    }

    let mut ensured = ctx.key_pairs.lock().await;
    if ensured.contains(&task.region) {
        return Ok(key_name);
    }

    let client = ec2::client(task).await;
    let result = client.create_key_pair().key_name(&key_name).send().await;
    match result {
        Ok(_) => {
            ctx.ledger.append(LedgerEntry::created(new_ref(
                ctx,
                task,
                ResourceType::KeyPair,
                &key_name,
            )))?;
            tracing::info!(region = %task.region, key = %key_name, "session key pair created");
        }
        Err(e) => {
            let (code, msg) = aws_code_and_msg(&e);
            if code != "InvalidKeyPair.Duplicate" {
                return Err(EngineError::Aws(msg));
            }
        }
    }
    ensured.insert(task.region.clone());
    Ok(key_name)
}

pub async fn create_instance(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    instance_type: &str,
    ami_id: &str,
) -> Result<(), EngineError> {
    if ctx.dry_run {
        let id = ctx.dry_run_id("i");
        let reference = new_ref(ctx, task, ResourceType::Instance, &id)
            .with_metadata("instance_type", serde_json::json!(instance_type))
            .with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::created(reference))?;
        tracing::info!(account = %task.handle.account_name, region = %task.region, "dry-run: would launch instance");
        return Ok(());
    }

    let key_name = ensure_key_pair(ctx, task).await?;
    let client = ec2::client(task).await;

    let tags = TagSpecification::builder()
        .resource_type(Ec2TagResource::Instance)
        .tags(
            Ec2Tag::builder()
                .key(SESSION_TAG)
                .value(ctx.session_id.as_str())
                .build(),
        )
        .tags(
            Ec2Tag::builder()
                .key(CREATOR_TAG)
                .value(task.handle.display_name())
                .build(),
        )
        .build();

    let response = retry_aws("run-instances", &ctx.cancel, || {
        let tags = tags.clone();
        async {
            client
                .run_instances()
                .image_id(ami_id)
                .instance_type(InstanceType::from(instance_type))
                .key_name(&key_name)
                .min_count(1)
                .max_count(1)
                .tag_specifications(tags)
                .send()
                .await
                .map_err(|e| aws_code_and_msg(&e))
        }
    })
    .await?;

    let instance_id = match response {
        AwsOp::Done(r) => r
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .map(String::from)
            .ok_or_else(|| EngineError::Aws("run-instances returned no instance".into()))?,
        AwsOp::AlreadyGone => {
            return Err(EngineError::Aws("run-instances: unexpected not-found".into()))
        }
    };

    let reference = new_ref(ctx, task, ResourceType::Instance, &instance_id)
        .with_metadata("instance_type", serde_json::json!(instance_type))
        .with_metadata("ami_id", serde_json::json!(ami_id));
    ctx.ledger.append(LedgerEntry::created(reference))?;
    tracing::info!(instance = %instance_id, region = %task.region, "instance launched");
    Ok(())
}

pub async fn create_asg(
    ctx: &Arc<WorkerContext>,
    task: &Task,
    instance_type: &str,
    ami_id: &str,
    min_size: i32,
    max_size: i32,
    desired_capacity: i32,
) -> Result<(), EngineError> {
    let owner = task
        .handle
        .username
        .clone()
        .unwrap_or_else(|| task.handle.account_name.clone());

    if ctx.dry_run {
        let id = ctx.dry_run_id("asg");
        let reference = new_ref(ctx, task, ResourceType::AutoScalingGroup, &id)
            .with_metadata("instance_type", serde_json::json!(instance_type))
            .with_metadata("dry_run", serde_json::json!(true));
        ctx.ledger.append(LedgerEntry::created(reference))?;
        tracing::info!(account = %task.handle.account_name, region = %task.region, "dry-run: would create ASG");
        return Ok(());
    }

    let key_name = ensure_key_pair(ctx, task).await?;
    let ec2_client = ec2::client(task).await;
    let suffix = short_suffix();

    // Launch template first; the ASG references it by id.
    let lt_name = format!("skysweep-lt-{owner}-{suffix}");
    let lt_data = RequestLaunchTemplateData::builder()
        .image_id(ami_id)
        .instance_type(InstanceType::from(instance_type))
        .key_name(&key_name)
        .build();

    let lt_response = retry_aws("create-launch-template", &ctx.cancel, || {
        let lt_data = lt_data.clone();
        async {
            ec2_client
                .create_launch_template()
                .launch_template_name(&lt_name)
                .launch_template_data(lt_data)
                .send()
                .await
                .map_err(|e| aws_code_and_msg(&e))
        }
    })
    .await?;

    let lt_id = match lt_response {
        AwsOp::Done(r) => r
            .launch_template()
            .and_then(|lt| lt.launch_template_id())
            .map(String::from)
            .ok_or_else(|| EngineError::Aws("create-launch-template returned no id".into()))?,
        AwsOp::AlreadyGone => {
            return Err(EngineError::Aws(
                "create-launch-template: unexpected not-found".into(),
            ))
        }
    };
    ctx.ledger.append(LedgerEntry::created(
        new_ref(ctx, task, ResourceType::LaunchTemplate, &lt_id)
            .with_metadata("name", serde_json::json!(lt_name)),
    ))?;

    let zones = availability_zones(&ec2_client).await?;

    let config = sdk::sdk_config(&task.handle, &task.region).await;
    let autoscaling = aws_sdk_autoscaling::Client::new(&config);
    let asg_name = format!("skysweep-asg-{owner}-{suffix}");
    let session_tag = AsgTag::builder()
        .key(SESSION_TAG)
        .value(ctx.session_id.as_str())
        .propagate_at_launch(true)
        .build()
        .map_err(|e| EngineError::Aws(format!("session tag: {e}")))?;

    let result = retry_aws("create-auto-scaling-group", &ctx.cancel, || {
        let zones = zones.clone();
        let session_tag = session_tag.clone();
        async {
            autoscaling
                .create_auto_scaling_group()
                .auto_scaling_group_name(&asg_name)
                .launch_template(
                    aws_sdk_autoscaling::types::LaunchTemplateSpecification::builder()
                        .launch_template_id(&lt_id)
                        .version("$Latest")
                        .build(),
                )
                .min_size(min_size)
                .max_size(max_size)
                .desired_capacity(desired_capacity)
                .set_availability_zones(Some(zones))
                .tags(session_tag)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| aws_code_and_msg(&e))
        }
    })
    .await?;
    if matches!(result, AwsOp::AlreadyGone) {
        return Err(EngineError::Aws(
            "create-auto-scaling-group: unexpected not-found".into(),
        ));
    }

    ctx.ledger.append(LedgerEntry::created(
        new_ref(ctx, task, ResourceType::AutoScalingGroup, &asg_name)
            .with_metadata("launch_template_id", serde_json::json!(lt_id)),
    ))?;
    tracing::info!(asg = %asg_name, region = %task.region, "auto scaling group created");
    Ok(())
}

async fn availability_zones(client: &aws_sdk_ec2::Client) -> Result<Vec<String>, EngineError> {
    let response = client
        .describe_availability_zones()
        .send()
        .await
        .map_err(|e| EngineError::Aws(aws_code_and_msg(&e).1))?;
    let zones: Vec<String> = response
        .availability_zones()
        .iter()
        .filter_map(|z| z.zone_name().map(String::from))
        .take(2)
        .collect();
    if zones.is_empty() {
        return Err(EngineError::Aws("no availability zones reported".into()));
    }
    Ok(zones)
}
