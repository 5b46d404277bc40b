//! Maps a task to its worker implementation.

use std::sync::Arc;

use skysweep_core::{Task, TaskKind, TaskOutcome};

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::{FollowUp, TaskExecution};
use crate::services;

pub async fn run_task(ctx: &Arc<WorkerContext>, task: &Task) -> TaskExecution {
    let result: Result<Vec<FollowUp>, EngineError> = match &task.kind {
        TaskKind::Discover { service } => services::discover(ctx, task, *service).await,

        TaskKind::CreateEc2 {
            instance_type,
            ami_id,
        } => services::provision::create_instance(ctx, task, instance_type, ami_id)
            .await
            .map(|_| Vec::new()),
        TaskKind::CreateAsg {
            instance_type,
            ami_id,
            min_size,
            max_size,
            desired_capacity,
        } => services::provision::create_asg(
            ctx,
            task,
            instance_type,
            ami_id,
            *min_size,
            *max_size,
            *desired_capacity,
        )
        .await
        .map(|_| Vec::new()),

        TaskKind::TerminateInstance {
            instance_id,
            security_groups,
        } => services::ec2::terminate_instance(ctx, task, instance_id, security_groups)
            .await
            .map(|_| Vec::new()),
        TaskKind::ClearSecurityGroupRules { group_id } => {
            services::ec2::clear_security_group_rules(ctx, task, group_id)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::DeleteSecurityGroup {
            group_id,
            group_name,
        } => services::ec2::delete_security_group(ctx, task, group_id, group_name)
            .await
            .map(|_| Vec::new()),

        TaskKind::StripBucket { bucket } => services::s3::strip_bucket(ctx, task, bucket)
            .await
            .map(|_| Vec::new()),
        TaskKind::DeleteBucket { bucket } => services::s3::delete_bucket(ctx, task, bucket)
            .await
            .map(|_| Vec::new()),

        TaskKind::DeleteEksAutoscaler { cluster } => {
            services::eks::delete_autoscaler(ctx, task, cluster)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::ConfigureEksAuth { cluster } => {
            services::eks::configure_auth(ctx, task, cluster)
                .await
                .map(|_| Vec::new())
        }

        TaskKind::RemoveRuleTargets { bus, rule } => {
            services::eventbridge::remove_rule_targets(ctx, task, bus, rule)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::DeleteRule { bus, rule } => services::eventbridge::delete_rule(ctx, task, bus, rule)
            .await
            .map(|_| Vec::new()),
        TaskKind::DeleteEventBus { bus } => services::eventbridge::delete_bus(ctx, task, bus)
            .await
            .map(|_| Vec::new()),
        TaskKind::DeleteEventArchive { archive } => {
            services::eventbridge::delete_archive(ctx, task, archive)
                .await
                .map(|_| Vec::new())
        }

        TaskKind::DeleteIamUser { username } => services::iam::delete_user(ctx, task, username)
            .await
            .map(|_| Vec::new()),
        TaskKind::DeleteIamGroup { group } => services::iam::delete_group(ctx, task, group)
            .await
            .map(|_| Vec::new()),

        TaskKind::DeleteRedshiftCluster { cluster_id } => {
            services::redshift::delete_cluster(ctx, task, cluster_id)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::DeleteRedshiftSubnetGroup { name } => {
            services::redshift::delete_subnet_group(ctx, task, name)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::DeleteRedshiftParameterGroup { name } => {
            services::redshift::delete_parameter_group(ctx, task, name)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::DeleteRedshiftScheduledAction { name } => {
            services::redshift::delete_scheduled_action(ctx, task, name)
                .await
                .map(|_| Vec::new())
        }

        TaskKind::DeleteStateMachine { arn } => {
            services::stepfunctions::delete_state_machine(ctx, task, arn)
                .await
                .map(|_| Vec::new())
        }

        TaskKind::StopNotebook { name } => services::sagemaker::stop_notebook(ctx, task, name)
            .await
            .map(|_| Vec::new()),
        TaskKind::DeleteNotebook { name } => services::sagemaker::delete_notebook(ctx, task, name)
            .await
            .map(|_| Vec::new()),
        TaskKind::DeleteSagemakerEndpoint { name } => {
            services::sagemaker::delete_endpoint(ctx, task, name)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::DeleteSagemakerEndpointConfig { name } => {
            services::sagemaker::delete_endpoint_config(ctx, task, name)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::DeleteSagemakerModel { name } => {
            services::sagemaker::delete_model(ctx, task, name)
                .await
                .map(|_| Vec::new())
        }

        TaskKind::DeleteMqBroker { broker_id } => services::mq::delete_broker(ctx, task, broker_id)
            .await
            .map(|_| Vec::new()),
        TaskKind::DeleteFsxFileSystem { file_system_id } => {
            services::fsx::delete_file_system(ctx, task, file_system_id)
                .await
                .map(|_| Vec::new())
        }
        TaskKind::DeleteStorageGateway { gateway_arn } => {
            services::storagegateway::delete_gateway(ctx, task, gateway_arn)
                .await
                .map(|_| Vec::new())
        }

        TaskKind::RunCloudNuke { config_path } => {
            services::nuke_task::run(ctx, task, config_path)
                .await
                .map(|_| Vec::new())
        }
    };

    match result {
        Ok(follow_ups) => TaskExecution {
            outcome: TaskOutcome::Succeeded,
            follow_ups,
        },
        Err(EngineError::Cancelled) => TaskExecution::done(TaskOutcome::Cancelled),
        Err(EngineError::Timeout { what }) => {
            tracing::error!(task = %task.id, what = %what, "task timed out");
            TaskExecution::done(TaskOutcome::TimedOut)
        }
        Err(e) => TaskExecution::done(TaskOutcome::Failed(format!("{}: {e}", e.kind()))),
    }
}
