use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shape of `ec2-region-ami-mapping.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmiMapping {
    pub region_ami_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub region_instance_types: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub allowed_instance_types: Vec<String>,
    /// AZs where EKS node groups cannot be placed, per region.
    #[serde(default)]
    pub eks_unsupported_azs: BTreeMap<String, Vec<String>>,
}

impl AmiMapping {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// AMI for a region; a provision task cannot proceed without one.
    pub fn ami_for(&self, region: &str) -> Result<&str, ConfigError> {
        self.region_ami_mapping
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::NoAmiForRegion(region.to_string()))
    }

    /// Instance types allowed in a region: the per-region list when present,
    /// otherwise the global allow-list.
    pub fn instance_types_for(&self, region: &str) -> &[String] {
        self.region_instance_types
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or(&self.allowed_instance_types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_lookup_and_fallback() {
        let mapping: AmiMapping = serde_json::from_str(
            r#"{
                "region_ami_mapping": {"us-east-1": "ami-0abc", "ap-south-1": "ami-0def"},
                "region_instance_types": {"ap-south-1": ["t3a.micro"]},
                "allowed_instance_types": ["t3.micro", "t3.small"],
                "eks_unsupported_azs": {"us-east-1": ["use1-az3"]}
            }"#,
        )
        .unwrap();

        assert_eq!(mapping.ami_for("us-east-1").unwrap(), "ami-0abc");
        assert!(matches!(
            mapping.ami_for("eu-west-3"),
            Err(ConfigError::NoAmiForRegion(_))
        ));
        assert_eq!(mapping.instance_types_for("ap-south-1"), ["t3a.micro"]);
        assert_eq!(
            mapping.instance_types_for("us-east-1"),
            ["t3.micro", "t3.small"]
        );
    }
}
