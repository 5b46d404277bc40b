//! Rollback: replay a session ledger in reverse and delete everything it
//! created.
//!
//! Best-effort by design; a failed retire is recorded and the replay moves
//! on. Ordering is reverse insertion, with auto-scaling groups pulled ahead
//! of launch templates ahead of instances so AWS-side references unwind in
//! the right order.

use std::collections::HashSet;
use std::path::Path;

use skysweep_core::{
    CredentialHandle, LedgerEntry, LedgerEvent, ResourceRef, ResourceType, SessionId,
};
use tokio_util::sync::CancellationToken;

use crate::error::{format_err_chain, EngineError};
use crate::ledger::SessionLedger;
use crate::retry::aws_code_and_msg;
use crate::sdk;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RollbackSummary {
    pub retired: usize,
    pub failed: usize,
}

/// Order `created` entries for rollback: reverse insertion, then priority.
///
/// Entries already retired later in the same ledger are excluded.
pub fn rollback_targets(entries: &[LedgerEntry]) -> Vec<ResourceRef> {
    let retired: HashSet<(ResourceType, String)> = entries
        .iter()
        .filter(|e| matches!(e.event, LedgerEvent::Retired))
        .map(|e| (e.resource.resource_type, e.resource.resource_id.clone()))
        .collect();

    let mut targets: Vec<ResourceRef> = entries
        .iter()
        .filter(|e| matches!(e.event, LedgerEvent::Created))
        .filter(|e| !retired.contains(&(e.resource.resource_type, e.resource.resource_id.clone())))
        .map(|e| e.resource.clone())
        .rev()
        .collect();

    // Stable sort keeps reverse-insertion order within a priority class.
    targets.sort_by(|a, b| {
        b.resource_type
            .rollback_priority()
            .cmp(&a.resource_type.rollback_priority())
    });
    targets
}

/// Roll back one session. `handles` supplies credentials, matched to each
/// ledger entry by account id; the ledger itself never stores secrets.
pub async fn rollback_session(
    dir: &Path,
    session_id: &SessionId,
    handles: &[CredentialHandle],
    cancel: &CancellationToken,
) -> Result<RollbackSummary, EngineError> {
    let path = SessionLedger::find(dir, session_id);
    let (ledger, header, entries) = SessionLedger::open(&path)?;
    let targets = rollback_targets(&entries);
    tracing::info!(
        session = %session_id,
        targets = targets.len(),
        dry_run = header.dry_run,
        "rollback started"
    );

    let mut summary = RollbackSummary::default();
    for resource in targets {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        if header.dry_run || resource.resource_id.starts_with("dry-run-") {
            ledger.append(LedgerEntry::retired_already_absent(resource))?;
            summary.retired += 1;
            continue;
        }

        let Some(handle) = handles.iter().find(|h| h.account_id == resource.account_id)
        else {
            tracing::error!(
                resource = %resource.resource_id,
                account = %resource.account_id,
                "no credentials for account, cannot retire"
            );
            ledger.append(LedgerEntry::failed_retire(resource, "no-credentials"))?;
            summary.failed += 1;
            continue;
        };

        match retire_resource(handle, &resource).await {
            Ok(already_absent) => {
                tracing::info!(
                    resource = %resource.resource_id,
                    kind = %resource.resource_type,
                    "rolled back"
                );
                let entry = if already_absent {
                    LedgerEntry::retired_already_absent(resource)
                } else {
                    LedgerEntry::retired(resource)
                };
                ledger.append(entry)?;
                summary.retired += 1;
            }
            Err(e) => {
                tracing::error!(
                    resource = %resource.resource_id,
                    kind = %resource.resource_type,
                    error = %e,
                    "rollback delete failed"
                );
                ledger.append(LedgerEntry::failed_retire(resource, e.kind()))?;
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        retired = summary.retired,
        failed = summary.failed,
        "rollback finished"
    );
    Ok(summary)
}

/// Delete one resource by type. Returns true when it was already absent.
async fn retire_resource(
    handle: &CredentialHandle,
    resource: &ResourceRef,
) -> Result<bool, EngineError> {
    let config = sdk::sdk_config(handle, &resource.region).await;

    macro_rules! run {
        ($fut:expr) => {
            match $fut.await {
                Ok(_) => Ok(false),
                Err(e) => {
                    let (code, _) = aws_code_and_msg(&e);
                    if skysweep_core::classify_aws_error(&code)
                        == skysweep_core::ErrorDisposition::AlreadyGone
                    {
                        Ok(true)
                    } else {
                        Err(EngineError::Aws(format_err_chain(&e)))
                    }
                }
            }
        };
    }

    match resource.resource_type {
        ResourceType::AutoScalingGroup => {
            let client = aws_sdk_autoscaling::Client::new(&config);
            run!(client
                .delete_auto_scaling_group()
                .auto_scaling_group_name(&resource.resource_id)
                .force_delete(true)
                .send())
        }
        ResourceType::LaunchTemplate => {
            let client = aws_sdk_ec2::Client::new(&config);
            run!(client
                .delete_launch_template()
                .launch_template_id(&resource.resource_id)
                .send())
        }
        ResourceType::Instance => {
            let client = aws_sdk_ec2::Client::new(&config);
            run!(client
                .terminate_instances()
                .instance_ids(&resource.resource_id)
                .send())
        }
        ResourceType::KeyPair => {
            let client = aws_sdk_ec2::Client::new(&config);
            run!(client.delete_key_pair().key_name(&resource.resource_id).send())
        }
        ResourceType::S3Bucket => {
            let client = aws_sdk_s3::Client::new(&config);
            run!(client.delete_bucket().bucket(&resource.resource_id).send())
        }
        other => Err(EngineError::Aws(format!(
            "rollback does not know how to retire {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn created(id: &str, rt: ResourceType) -> LedgerEntry {
        LedgerEntry::created(ResourceRef {
            resource_id: id.to_string(),
            resource_type: rt,
            account_name: "account01".into(),
            account_id: "111111111111".into(),
            region: "us-east-1".into(),
            created_at: jiff::Timestamp::now(),
            session_id: SessionId("20250801_120000_ab12".into()),
            metadata: BTreeMap::new(),
        })
    }

    #[test]
    fn asg_then_template_then_instance() {
        // Creation order: template, ASG, instance; like a real provision run.
        let entries = vec![
            created("lt-1", ResourceType::LaunchTemplate),
            created("asg-1", ResourceType::AutoScalingGroup),
            created("i-1", ResourceType::Instance),
        ];
        let targets = rollback_targets(&entries);
        let order: Vec<&str> = targets.iter().map(|r| r.resource_id.as_str()).collect();
        assert_eq!(order, ["asg-1", "lt-1", "i-1"]);
    }

    #[test]
    fn already_retired_entries_are_excluded() {
        let mut entries = vec![
            created("i-1", ResourceType::Instance),
            created("i-2", ResourceType::Instance),
        ];
        let first = entries[0].resource.clone();
        entries.push(LedgerEntry::retired(first));

        let targets = rollback_targets(&entries);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].resource_id, "i-2");
    }

    #[test]
    fn same_priority_unwinds_in_reverse_creation_order() {
        let entries = vec![
            created("i-1", ResourceType::Instance),
            created("i-2", ResourceType::Instance),
            created("i-3", ResourceType::Instance),
        ];
        let order: Vec<&str> = rollback_targets(&entries)
            .iter()
            .map(|r| r.resource_id.as_str())
            .collect();
        assert_eq!(order, ["i-3", "i-2", "i-1"]);
    }
}
