//! End-to-end dry-run behavior: a provision session touches no AWS API,
//! still writes a full ledger, and rolls back cleanly.

use skysweep_core::{CredentialHandle, CredentialKind, LedgerEvent};
use skysweep_engine::ledger::SessionLedger;
use skysweep_engine::planner::Intent;
use skysweep_engine::{rollback_session, run_session, SessionOptions};
use tokio_util::sync::CancellationToken;

fn handle(name: &str, region: &str) -> CredentialHandle {
    CredentialHandle {
        account_name: name.to_string(),
        account_id: format!("{:0>12}", name.trim_start_matches("account")),
        email: format!("{name}@example.com"),
        access_key: "AKIAEXAMPLE".into(),
        secret_key: "secret".into(),
        kind: CredentialKind::Root,
        username: None,
        regions: vec![region.to_string()],
    }
}

fn provision_intent(region: &str) -> Intent {
    Intent::Provision {
        create_ec2: true,
        create_asg: true,
        instance_type: "m5.xlarge".into(),
        ami_by_region: [(region.to_string(), "ami-0abc".to_string())].into(),
    }
}

#[tokio::test]
async fn dry_run_provision_writes_simulated_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let handles = vec![
        handle("account01", "us-east-1"),
        handle("account02", "us-east-1"),
        handle("account03", "us-east-1"),
    ];

    let summary = run_session(
        handles,
        provision_intent("us-east-1"),
        SessionOptions {
            dry_run: true,
            output_dir: dir.path().to_path_buf(),
            user: "test".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.counts.succeeded, 6);
    assert_eq!(summary.counts.failed, 0);

    // 3 identities × (createEc2 + createAsg) = 6 simulated creations.
    let created: Vec<_> = summary
        .entries
        .iter()
        .filter(|e| e.event == LedgerEvent::Created)
        .collect();
    assert_eq!(created.len(), 6);
    for entry in &created {
        assert!(
            entry.resource.resource_id.starts_with("dry-run-"),
            "unexpected id {}",
            entry.resource.resource_id
        );
    }

    // The ledger on disk matches what the summary reports.
    let (header, entries) = SessionLedger::read(&summary.ledger_path).unwrap();
    assert!(header.dry_run);
    assert_eq!(entries.len(), 6);
}

#[tokio::test]
async fn dry_run_session_rolls_back_every_creation() {
    let dir = tempfile::tempdir().unwrap();
    let handles = vec![handle("account01", "us-east-1")];

    let summary = run_session(
        handles.clone(),
        provision_intent("us-east-1"),
        SessionOptions {
            dry_run: true,
            output_dir: dir.path().to_path_buf(),
            user: "test".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(summary.counts.succeeded, 2);

    let rollback = rollback_session(
        dir.path(),
        &summary.session_id,
        &handles,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(rollback.retired, 2);
    assert_eq!(rollback.failed, 0);

    // Every created entry now has a matching retired entry.
    let (_, entries) = SessionLedger::read(&summary.ledger_path).unwrap();
    for entry in entries.iter().filter(|e| e.event == LedgerEvent::Created) {
        let retired = entries.iter().any(|other| {
            other.event == LedgerEvent::Retired
                && other.resource.resource_id == entry.resource.resource_id
        });
        assert!(retired, "{} was not retired", entry.resource.resource_id);
    }
}

#[tokio::test]
async fn empty_plan_session_succeeds_with_zero_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let summary = run_session(
        vec![handle("account01", "us-east-1")],
        Intent::Provision {
            create_ec2: false,
            create_asg: false,
            instance_type: "m5.xlarge".into(),
            ami_by_region: [("us-east-1".to_string(), "ami-0abc".to_string())].into(),
        },
        SessionOptions {
            dry_run: true,
            output_dir: dir.path().to_path_buf(),
            user: "test".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.counts.total(), 0);
    assert!(summary.entries.is_empty());
}
