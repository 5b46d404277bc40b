use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shape of `user_mapping.json`. The file is optional; an absent file
/// yields an empty mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMapping {
    #[serde(default)]
    pub user_mappings: BTreeMap<String, MappedUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedUser {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl UserMapping {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no user mapping file, using empty mapping");
            return Ok(Self::default());
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

    pub fn lookup(&self, username: &str) -> Option<&MappedUser> {
        self.user_mappings.get(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = UserMapping::load(&dir.path().join("user_mapping.json")).unwrap();
        assert!(mapping.user_mappings.is_empty());
    }

    #[test]
    fn lookup_finds_mapped_user() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_mapping.json");
        std::fs::write(
            &path,
            r#"{"user_mappings": {"clouduser01": {"first_name": "Pat", "last_name": "Kim", "email": "pat@example.com"}}}"#,
        )
        .unwrap();

        let mapping = UserMapping::load(&path).unwrap();
        assert_eq!(mapping.lookup("clouduser01").unwrap().email, "pat@example.com");
        assert!(mapping.lookup("nobody").is_none());
    }
}
