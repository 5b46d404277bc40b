//! aws-auth ConfigMap computation for EKS clusters.
//!
//! Cluster names encode their creator: `eks-cluster-root-account03-...` was
//! created by the account root, `eks-cluster-account03_clouduser01-us-east-1-...`
//! by that IAM user. Root-created clusters map only the root principal;
//! IAM-created clusters map the creating user *and* root, both as
//! cluster-admin. Rendering uses the same `mapUsers`/`mapRoles` document
//! shape the aws-iam-authenticator consumes.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const CLUSTER_ADMIN_GROUP: &str = "system:masters";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapUser {
    pub userarn: String,
    pub username: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRole {
    pub rolearn: String,
    pub username: String,
    pub groups: Vec<String>,
}

/// Who created the cluster, derived from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCreator {
    Root,
    IamUser(String),
}

static IAM_CLUSTER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    // eks-cluster-<username>-<region>-<suffix>; usernames may contain
    // underscores, regions look like us-east-1 / ap-southeast-2.
    Regex::new(r"^eks-cluster-(.+)-([a-z]{2}(?:-[a-z]+)+-\d+)(?:-|$)").expect("valid regex")
});

/// Classify a cluster by its name.
pub fn classify_cluster(cluster_name: &str) -> Result<ClusterCreator, EngineError> {
    if cluster_name.contains("-root-") {
        return Ok(ClusterCreator::Root);
    }
    let captures = IAM_CLUSTER_NAME.captures(cluster_name).ok_or_else(|| {
        EngineError::Kube(format!(
            "cluster name {cluster_name:?} does not encode a creator"
        ))
    })?;
    Ok(ClusterCreator::IamUser(captures[1].to_string()))
}

/// The exact principal set required for a cluster's creator class.
pub fn auth_map_users(
    cluster_name: &str,
    account_id: &str,
) -> Result<Vec<MapUser>, EngineError> {
    let root_entry = MapUser {
        userarn: format!("arn:aws:iam::{account_id}:root"),
        username: "root".to_string(),
        groups: vec![CLUSTER_ADMIN_GROUP.to_string()],
    };

    match classify_cluster(cluster_name)? {
        ClusterCreator::Root => Ok(vec![root_entry]),
        ClusterCreator::IamUser(username) => Ok(vec![
            MapUser {
                userarn: format!("arn:aws:iam::{account_id}:user/{username}"),
                username,
                groups: vec![CLUSTER_ADMIN_GROUP.to_string()],
            },
            root_entry,
        ]),
    }
}

/// Principal ARNs for API-mode access entries, same creator rules.
pub fn access_entry_arns(
    cluster_name: &str,
    account_id: &str,
) -> Result<Vec<String>, EngineError> {
    Ok(auth_map_users(cluster_name, account_id)?
        .into_iter()
        .map(|u| u.userarn)
        .collect())
}

#[derive(Serialize)]
struct ConfigMapDoc {
    #[serde(rename = "apiVersion")]
    api_version: String,
    kind: String,
    metadata: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
}

/// Render the full aws-auth ConfigMap manifest.
pub fn render_configmap(users: &[MapUser], roles: &[MapRole]) -> Result<String, EngineError> {
    let map_users =
        serde_yaml::to_string(users).map_err(|e| EngineError::Kube(e.to_string()))?;
    let map_roles =
        serde_yaml::to_string(roles).map_err(|e| EngineError::Kube(e.to_string()))?;

    let doc = ConfigMapDoc {
        api_version: "v1".to_string(),
        kind: "ConfigMap".to_string(),
        metadata: BTreeMap::from([
            ("name".to_string(), "aws-auth".to_string()),
            ("namespace".to_string(), "kube-system".to_string()),
        ]),
        data: BTreeMap::from([
            ("mapRoles".to_string(), map_roles),
            ("mapUsers".to_string(), map_users),
        ]),
    };
    serde_yaml::to_string(&doc).map_err(|e| EngineError::Kube(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iam_cluster_maps_user_and_root() {
        let users = auth_map_users(
            "eks-cluster-account03_clouduser01-us-east-1-diox",
            "123456789012",
        )
        .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(
            users[0].userarn,
            "arn:aws:iam::123456789012:user/account03_clouduser01"
        );
        assert_eq!(users[0].groups, vec!["system:masters"]);
        assert_eq!(users[1].userarn, "arn:aws:iam::123456789012:root");
        assert_eq!(users[1].groups, vec!["system:masters"]);
    }

    #[test]
    fn root_cluster_maps_only_root() {
        let users = auth_map_users("eks-cluster-root-account03-us-east-1-diox", "123456789012")
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].userarn, "arn:aws:iam::123456789012:root");
    }

    #[test]
    fn classification_extracts_username() {
        assert_eq!(
            classify_cluster("eks-cluster-account07_clouduser03-ap-southeast-2-k9x").unwrap(),
            ClusterCreator::IamUser("account07_clouduser03".to_string())
        );
        assert_eq!(
            classify_cluster("eks-cluster-root-account07-ap-southeast-2-k9x").unwrap(),
            ClusterCreator::Root
        );
    }

    #[test]
    fn unparseable_name_is_an_error() {
        assert!(classify_cluster("my-own-cluster").is_err());
    }

    #[test]
    fn rendered_configmap_has_expected_shape() {
        let users = auth_map_users(
            "eks-cluster-account03_clouduser01-us-east-1-diox",
            "123456789012",
        )
        .unwrap();
        let yaml = render_configmap(&users, &[]).unwrap();
        assert!(yaml.contains("kind: ConfigMap"));
        assert!(yaml.contains("name: aws-auth"));
        assert!(yaml.contains("namespace: kube-system"));
        assert!(yaml.contains("mapUsers"));
        assert!(yaml.contains("arn:aws:iam::123456789012:user/account03_clouduser01"));
        assert!(yaml.contains("system:masters"));
    }
}
