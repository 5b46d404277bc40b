use serde::{Deserialize, Serialize};

use crate::handle::CredentialHandle;

/// Monotonic task identifier, assigned by the planner in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// AWS service a discovery task enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    Ec2,
    S3,
    Eks,
    EventBridge,
    Redshift,
    StepFunctions,
    SageMaker,
    Iam,
    Mq,
    Fsx,
    StorageGateway,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Ec2 => "ec2",
            Service::S3 => "s3",
            Service::Eks => "eks",
            Service::EventBridge => "eventbridge",
            Service::Redshift => "redshift",
            Service::StepFunctions => "stepfunctions",
            Service::SageMaker => "sagemaker",
            Service::Iam => "iam",
            Service::Mq => "mq",
            Service::Fsx => "fsx",
            Service::StorageGateway => "storagegateway",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work. Each variant carries the parameters its worker needs;
/// the owning [`Task`] supplies credentials and region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskKind {
    CreateEc2 {
        instance_type: String,
        ami_id: String,
    },
    CreateAsg {
        instance_type: String,
        ami_id: String,
        min_size: i32,
        max_size: i32,
        desired_capacity: i32,
    },
    /// Enumerate resources for one service; on success the executor expands
    /// the findings into concrete delete tasks.
    Discover {
        service: Service,
    },
    TerminateInstance {
        instance_id: String,
        security_groups: Vec<String>,
    },
    ClearSecurityGroupRules {
        group_id: String,
    },
    DeleteSecurityGroup {
        group_id: String,
        group_name: String,
    },
    /// Remove replication, disable versioning, delete every object, version,
    /// and delete marker, and clear bucket subresources.
    StripBucket {
        bucket: String,
    },
    DeleteBucket {
        bucket: String,
    },
    DeleteEksAutoscaler {
        cluster: String,
    },
    ConfigureEksAuth {
        cluster: String,
    },
    RemoveRuleTargets {
        bus: String,
        rule: String,
    },
    DeleteRule {
        bus: String,
        rule: String,
    },
    DeleteEventBus {
        bus: String,
    },
    DeleteEventArchive {
        archive: String,
    },
    DeleteIamUser {
        username: String,
    },
    DeleteIamGroup {
        group: String,
    },
    DeleteRedshiftCluster {
        cluster_id: String,
    },
    DeleteRedshiftSubnetGroup {
        name: String,
    },
    DeleteRedshiftParameterGroup {
        name: String,
    },
    DeleteRedshiftScheduledAction {
        name: String,
    },
    DeleteStateMachine {
        arn: String,
    },
    StopNotebook {
        name: String,
    },
    DeleteNotebook {
        name: String,
    },
    DeleteSagemakerEndpoint {
        name: String,
    },
    DeleteSagemakerEndpointConfig {
        name: String,
    },
    DeleteSagemakerModel {
        name: String,
    },
    DeleteMqBroker {
        broker_id: String,
    },
    DeleteFsxFileSystem {
        file_system_id: String,
    },
    DeleteStorageGateway {
        gateway_arn: String,
    },
    /// Run the external cloud-nuke binary against this handle's account.
    RunCloudNuke {
        config_path: String,
    },
}

/// Ready-queue ordering class. Higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    Create = 0,
    Delete = 1,
    /// Discovery and shared-dependency clearing (rule targets, SG rules,
    /// notebook stop); these unblock whole groups of deletes.
    Unblock = 2,
}

impl TaskKind {
    pub fn priority(&self) -> TaskPriority {
        match self {
            TaskKind::CreateEc2 { .. } | TaskKind::CreateAsg { .. } => TaskPriority::Create,
            TaskKind::Discover { .. }
            | TaskKind::ClearSecurityGroupRules { .. }
            | TaskKind::RemoveRuleTargets { .. }
            | TaskKind::StopNotebook { .. }
            | TaskKind::StripBucket { .. } => TaskPriority::Unblock,
            _ => TaskPriority::Delete,
        }
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::CreateEc2 { .. } => "create-ec2",
            TaskKind::CreateAsg { .. } => "create-asg",
            TaskKind::Discover { .. } => "discover",
            TaskKind::TerminateInstance { .. } => "terminate-instance",
            TaskKind::ClearSecurityGroupRules { .. } => "clear-sg-rules",
            TaskKind::DeleteSecurityGroup { .. } => "delete-security-group",
            TaskKind::StripBucket { .. } => "strip-bucket",
            TaskKind::DeleteBucket { .. } => "delete-bucket",
            TaskKind::DeleteEksAutoscaler { .. } => "delete-eks-autoscaler",
            TaskKind::ConfigureEksAuth { .. } => "configure-eks-auth",
            TaskKind::RemoveRuleTargets { .. } => "remove-rule-targets",
            TaskKind::DeleteRule { .. } => "delete-rule",
            TaskKind::DeleteEventBus { .. } => "delete-event-bus",
            TaskKind::DeleteEventArchive { .. } => "delete-event-archive",
            TaskKind::DeleteIamUser { .. } => "delete-iam-user",
            TaskKind::DeleteIamGroup { .. } => "delete-iam-group",
            TaskKind::DeleteRedshiftCluster { .. } => "delete-redshift-cluster",
            TaskKind::DeleteRedshiftSubnetGroup { .. } => "delete-redshift-subnet-group",
            TaskKind::DeleteRedshiftParameterGroup { .. } => "delete-redshift-parameter-group",
            TaskKind::DeleteRedshiftScheduledAction { .. } => "delete-redshift-scheduled-action",
            TaskKind::DeleteStateMachine { .. } => "delete-state-machine",
            TaskKind::StopNotebook { .. } => "stop-notebook",
            TaskKind::DeleteNotebook { .. } => "delete-notebook",
            TaskKind::DeleteSagemakerEndpoint { .. } => "delete-sagemaker-endpoint",
            TaskKind::DeleteSagemakerEndpointConfig { .. } => "delete-sagemaker-endpoint-config",
            TaskKind::DeleteSagemakerModel { .. } => "delete-sagemaker-model",
            TaskKind::DeleteMqBroker { .. } => "delete-mq-broker",
            TaskKind::DeleteFsxFileSystem { .. } => "delete-fsx-file-system",
            TaskKind::DeleteStorageGateway { .. } => "delete-storage-gateway",
            TaskKind::RunCloudNuke { .. } => "run-cloud-nuke",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Why a task was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    ParentFailed,
    Cancelled,
}

/// Terminal result a worker reports back to the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
    TimedOut,
}

/// One schedulable unit of work.
///
/// Invariant (enforced by the dependency graph): a task transitions to
/// `Running` only when every hard dependency is `Succeeded` or `Skipped`.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub handle: CredentialHandle,
    pub region: String,
    pub depends_on: Vec<TaskId>,
    /// Soft dependencies order execution but do not propagate failure.
    pub soft_depends_on: Vec<TaskId>,
    pub attempts: u32,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(id: TaskId, kind: TaskKind, handle: CredentialHandle, region: String) -> Self {
        Self {
            id,
            kind,
            handle,
            region,
            depends_on: Vec::new(),
            soft_depends_on: Vec::new(),
            attempts: 0,
            status: TaskStatus::Pending,
        }
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.depends_on.extend(ids);
        self
    }

    pub fn priority(&self) -> TaskPriority {
        self.kind.priority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblock_tasks_outrank_deletes_outrank_creates() {
        let clear = TaskKind::ClearSecurityGroupRules {
            group_id: "sg-1".into(),
        };
        let del = TaskKind::DeleteSecurityGroup {
            group_id: "sg-1".into(),
            group_name: "web".into(),
        };
        let create = TaskKind::CreateEc2 {
            instance_type: "m5.xlarge".into(),
            ami_id: "ami-1".into(),
        };
        assert!(clear.priority() > del.priority());
        assert!(del.priority() > create.priority());
    }

    #[test]
    fn task_kind_round_trips_through_json() {
        let kind = TaskKind::RemoveRuleTargets {
            bus: "orders".into(),
            rule: "nightly".into(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"kind\":\"remove-rule-targets\""));
        let back: TaskKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }
}
