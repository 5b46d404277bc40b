//! Pure aggregation from ledger entries to a per-account report model.
//! No AWS calls, no engine types; the ledger is the whole input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skysweep_core::{LedgerEntry, LedgerEvent};

/// Everything the reporter needs about one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub started_at: jiff::Timestamp,
    pub ended_at: jiff::Timestamp,
    pub user: String,
    pub dry_run: bool,
    pub accounts: Vec<AccountSummary>,
    pub totals: Totals,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_name: String,
    pub account_id: String,
    pub created: usize,
    pub retired: usize,
    pub cleared: usize,
    pub failed: usize,
    pub outcome: AccountOutcome,
    /// Per resource-type counts, for the CSV and the table rows.
    pub by_type: BTreeMap<String, TypeCounts>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TypeCounts {
    pub created: usize,
    pub retired: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountOutcome {
    Successful,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Totals {
    pub created: usize,
    pub retired: usize,
    pub cleared: usize,
    pub failed: usize,
}

/// Header-level facts the reporter cannot derive from entries alone.
#[derive(Debug, Clone)]
pub struct SessionFacts {
    pub session_id: String,
    pub started_at: jiff::Timestamp,
    pub ended_at: jiff::Timestamp,
    pub user: String,
    pub dry_run: bool,
}

pub fn build_report(facts: SessionFacts, entries: Vec<LedgerEntry>) -> SessionReport {
    let mut accounts: BTreeMap<String, AccountSummary> = BTreeMap::new();
    let mut totals = Totals::default();

    for entry in &entries {
        let account = accounts
            .entry(entry.resource.account_name.clone())
            .or_insert_with(|| AccountSummary {
                account_name: entry.resource.account_name.clone(),
                account_id: entry.resource.account_id.clone(),
                created: 0,
                retired: 0,
                cleared: 0,
                failed: 0,
                outcome: AccountOutcome::Successful,
                by_type: BTreeMap::new(),
            });
        let type_counts = account
            .by_type
            .entry(entry.resource.resource_type.as_str().to_string())
            .or_default();

        match entry.event {
            LedgerEvent::Created => {
                account.created += 1;
                type_counts.created += 1;
                totals.created += 1;
            }
            LedgerEvent::Retired => {
                account.retired += 1;
                type_counts.retired += 1;
                totals.retired += 1;
            }
            LedgerEvent::Cleared => {
                account.cleared += 1;
                totals.cleared += 1;
            }
            LedgerEvent::Failed | LedgerEvent::FailedRetire => {
                account.failed += 1;
                type_counts.failed += 1;
                totals.failed += 1;
            }
        }
    }

    for account in accounts.values_mut() {
        account.outcome = if account.failed == 0 {
            AccountOutcome::Successful
        } else if account.created + account.retired + account.cleared > 0 {
            AccountOutcome::Partial
        } else {
            AccountOutcome::Failed
        };
    }

    SessionReport {
        session_id: facts.session_id,
        started_at: facts.started_at,
        ended_at: facts.ended_at,
        user: facts.user,
        dry_run: facts.dry_run,
        accounts: accounts.into_values().collect(),
        totals,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skysweep_core::{ResourceRef, ResourceType, SessionId};

    fn entry(event: LedgerEvent, account: &str, rt: ResourceType, id: &str) -> LedgerEntry {
        let reference = ResourceRef {
            resource_id: id.to_string(),
            resource_type: rt,
            account_name: account.to_string(),
            account_id: "111111111111".into(),
            region: "us-east-1".into(),
            created_at: jiff::Timestamp::now(),
            session_id: SessionId("20250801_120000_ab12".into()),
            metadata: Default::default(),
        };
        match event {
            LedgerEvent::Created => LedgerEntry::created(reference),
            LedgerEvent::Cleared => LedgerEntry::cleared(reference),
            LedgerEvent::Retired => LedgerEntry::retired(reference),
            LedgerEvent::Failed => LedgerEntry::failed(reference, "aws"),
            LedgerEvent::FailedRetire => LedgerEntry::failed_retire(reference, "aws"),
        }
    }

    fn facts() -> SessionFacts {
        SessionFacts {
            session_id: "20250801_120000_ab12".into(),
            started_at: jiff::Timestamp::now(),
            ended_at: jiff::Timestamp::now(),
            user: "ops".into(),
            dry_run: false,
        }
    }

    #[test]
    fn outcomes_split_by_failure_mix() {
        let entries = vec![
            entry(LedgerEvent::Retired, "clean", ResourceType::Instance, "i-1"),
            entry(LedgerEvent::Retired, "mixed", ResourceType::Instance, "i-2"),
            entry(LedgerEvent::Failed, "mixed", ResourceType::S3Bucket, "b-1"),
            entry(LedgerEvent::Failed, "broken", ResourceType::S3Bucket, "b-2"),
        ];
        let report = build_report(facts(), entries);

        let by_name: BTreeMap<&str, &AccountSummary> = report
            .accounts
            .iter()
            .map(|a| (a.account_name.as_str(), a))
            .collect();
        assert_eq!(by_name["clean"].outcome, AccountOutcome::Successful);
        assert_eq!(by_name["mixed"].outcome, AccountOutcome::Partial);
        assert_eq!(by_name["broken"].outcome, AccountOutcome::Failed);
        assert_eq!(report.totals.retired, 2);
        assert_eq!(report.totals.failed, 2);
    }

    #[test]
    fn by_type_counts_accumulate() {
        let entries = vec![
            entry(LedgerEvent::Created, "a", ResourceType::Instance, "i-1"),
            entry(LedgerEvent::Created, "a", ResourceType::Instance, "i-2"),
            entry(LedgerEvent::Created, "a", ResourceType::AutoScalingGroup, "asg-1"),
        ];
        let report = build_report(facts(), entries);
        let account = &report.accounts[0];
        assert_eq!(account.by_type["instance"].created, 2);
        assert_eq!(account.by_type["auto-scaling-group"].created, 1);
    }

    #[test]
    fn empty_session_reports_cleanly() {
        let report = build_report(facts(), Vec::new());
        assert!(report.accounts.is_empty());
        assert_eq!(report.totals.created, 0);
    }
}
