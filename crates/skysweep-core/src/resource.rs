use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Every resource kind the engine creates or reclaims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Instance,
    KeyPair,
    LaunchTemplate,
    AutoScalingGroup,
    SecurityGroup,
    S3Bucket,
    EksAutoscaler,
    EksAuthMapping,
    EventRule,
    EventBus,
    EventArchive,
    IamUser,
    IamGroup,
    RedshiftCluster,
    RedshiftSubnetGroup,
    RedshiftParameterGroup,
    RedshiftScheduledAction,
    StateMachine,
    NotebookInstance,
    SagemakerEndpoint,
    SagemakerEndpointConfig,
    SagemakerModel,
    MqBroker,
    FsxFileSystem,
    GatewayStorage,
    /// Whole-account sweep performed by an external tool.
    Account,
}

impl ResourceType {
    /// Rollback replays the ledger in reverse creation order, but some kinds
    /// must still jump the queue: an ASG has to go before the launch template
    /// it references, and both before the instances it spawned.
    pub fn rollback_priority(&self) -> u8 {
        match self {
            ResourceType::AutoScalingGroup => 3,
            ResourceType::LaunchTemplate => 2,
            ResourceType::Instance => 1,
            _ => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Instance => "instance",
            ResourceType::KeyPair => "key-pair",
            ResourceType::LaunchTemplate => "launch-template",
            ResourceType::AutoScalingGroup => "auto-scaling-group",
            ResourceType::SecurityGroup => "security-group",
            ResourceType::S3Bucket => "s3-bucket",
            ResourceType::EksAutoscaler => "eks-autoscaler",
            ResourceType::EksAuthMapping => "eks-auth-mapping",
            ResourceType::EventRule => "event-rule",
            ResourceType::EventBus => "event-bus",
            ResourceType::EventArchive => "event-archive",
            ResourceType::IamUser => "iam-user",
            ResourceType::IamGroup => "iam-group",
            ResourceType::RedshiftCluster => "redshift-cluster",
            ResourceType::RedshiftSubnetGroup => "redshift-subnet-group",
            ResourceType::RedshiftParameterGroup => "redshift-parameter-group",
            ResourceType::RedshiftScheduledAction => "redshift-scheduled-action",
            ResourceType::StateMachine => "state-machine",
            ResourceType::NotebookInstance => "notebook-instance",
            ResourceType::SagemakerEndpoint => "sagemaker-endpoint",
            ResourceType::SagemakerEndpointConfig => "sagemaker-endpoint-config",
            ResourceType::SagemakerModel => "sagemaker-model",
            ResourceType::MqBroker => "mq-broker",
            ResourceType::FsxFileSystem => "fsx-file-system",
            ResourceType::GatewayStorage => "gateway-storage",
            ResourceType::Account => "account",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one AWS resource the engine touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub account_name: String,
    pub account_id: String,
    pub region: String,
    pub created_at: jiff::Timestamp,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ResourceRef {
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_priorities_order_asg_before_template_before_instance() {
        assert!(
            ResourceType::AutoScalingGroup.rollback_priority()
                > ResourceType::LaunchTemplate.rollback_priority()
        );
        assert!(
            ResourceType::LaunchTemplate.rollback_priority()
                > ResourceType::Instance.rollback_priority()
        );
        assert!(
            ResourceType::Instance.rollback_priority()
                > ResourceType::S3Bucket.rollback_priority()
        );
    }

    #[test]
    fn resource_type_serializes_kebab_case() {
        let json = serde_json::to_string(&ResourceType::AutoScalingGroup).unwrap();
        assert_eq!(json, "\"auto-scaling-group\"");
    }
}
