use serde::{Deserialize, Serialize};

use crate::resource::ResourceRef;
use crate::session::SessionId;

/// First line of every ledger file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerHeader {
    pub session_id: SessionId,
    pub started_at: jiff::Timestamp,
    pub user: String,
    pub dry_run: bool,
    /// The invocation configuration, captured verbatim for the report.
    pub invocation: serde_json::Value,
}

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerEvent {
    /// The engine created this resource.
    Created,
    /// An intermediate pass removed contents or references (security-group
    /// rules, rule targets, bucket objects) without deleting the resource.
    Cleared,
    /// The engine deleted this resource (or found it already gone).
    Retired,
    /// The engine tried and failed to act on this resource.
    Failed,
    /// Rollback attempted to retire this resource and could not.
    FailedRetire,
}

/// One appended record. Entries are totally ordered by append position;
/// the `Created` entry for a resource is durable before the engine reports
/// the creation externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event: LedgerEvent,
    #[serde(rename = "ref")]
    pub resource: ResourceRef,
    pub timestamp: jiff::Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Set on `Retired` entries when the resource was already absent at
    /// delete time (delete treated as success).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub already_absent: bool,
}

impl LedgerEntry {
    pub fn created(resource: ResourceRef) -> Self {
        Self {
            event: LedgerEvent::Created,
            resource,
            timestamp: jiff::Timestamp::now(),
            error_kind: None,
            already_absent: false,
        }
    }

    pub fn cleared(resource: ResourceRef) -> Self {
        Self {
            event: LedgerEvent::Cleared,
            resource,
            timestamp: jiff::Timestamp::now(),
            error_kind: None,
            already_absent: false,
        }
    }

    pub fn retired(resource: ResourceRef) -> Self {
        Self {
            event: LedgerEvent::Retired,
            resource,
            timestamp: jiff::Timestamp::now(),
            error_kind: None,
            already_absent: false,
        }
    }

    pub fn retired_already_absent(resource: ResourceRef) -> Self {
        Self {
            already_absent: true,
            ..Self::retired(resource)
        }
    }

    pub fn failed(resource: ResourceRef, error_kind: impl Into<String>) -> Self {
        Self {
            event: LedgerEvent::Failed,
            resource,
            timestamp: jiff::Timestamp::now(),
            error_kind: Some(error_kind.into()),
            already_absent: false,
        }
    }

    pub fn failed_retire(resource: ResourceRef, error_kind: impl Into<String>) -> Self {
        Self {
            event: LedgerEvent::FailedRetire,
            resource,
            timestamp: jiff::Timestamp::now(),
            error_kind: Some(error_kind.into()),
            already_absent: false,
        }
    }
}
