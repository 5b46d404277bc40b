use serde::{Deserialize, Serialize};

/// Unique id for one end-to-end invocation.
///
/// Format: `YYYYMMDD_HHMMSS_<4 hex chars>`. The timestamp half keeps ledger
/// files sortable on disk; the suffix disambiguates sessions started within
/// the same second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        let now = jiff::Zoned::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}_{}",
            now.strftime("%Y%m%d_%H%M%S"),
            &suffix[..4]
        ))
    }

    /// Ledger file name for this session, e.g. `session_20250801_142233_a1b2.json`.
    pub fn ledger_file_name(&self) -> String {
        format!("session_{}.json", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_has_expected_shape() {
        let id = SessionId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn ledger_file_name_is_prefixed() {
        let id = SessionId("20250801_120000_ab12".into());
        assert_eq!(id.ledger_file_name(), "session_20250801_120000_ab12.json");
    }

    #[test]
    fn two_sessions_do_not_collide() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
