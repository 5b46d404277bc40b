use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use skysweep_core::SessionId;
use tokio_util::sync::CancellationToken;

use crate::ledger::SessionLedger;
use crate::nuke::PromptedToolOptions;

/// Shared state every worker sees.
pub struct WorkerContext {
    pub session_id: SessionId,
    pub ledger: Arc<SessionLedger>,
    pub dry_run: bool,
    pub cancel: CancellationToken,
    /// Whole-task deadline (CloudNuke and other long operations). The
    /// per-API-call deadline lives in the SDK config, not here.
    pub task_deadline: Duration,
    /// kubectl apply deadline.
    pub kube_deadline: Duration,
    /// Remaining resource budget for discovery expansion.
    pub resource_budget: AtomicUsize,
    /// Regions where the session key pair has been ensured.
    pub key_pairs: tokio::sync::Mutex<HashSet<String>>,
    pub nuke: PromptedToolOptions,
}

impl WorkerContext {
    pub fn new(
        session_id: SessionId,
        ledger: Arc<SessionLedger>,
        dry_run: bool,
        cancel: CancellationToken,
        max_resources: usize,
    ) -> Self {
        Self {
            session_id,
            ledger,
            dry_run,
            cancel,
            task_deadline: Duration::from_secs(1800),
            kube_deadline: Duration::from_secs(300),
            resource_budget: AtomicUsize::new(max_resources),
            key_pairs: tokio::sync::Mutex::new(HashSet::new()),
            nuke: PromptedToolOptions::default(),
        }
    }

    /// Claim budget for `n` discovered resources. Returns false when the
    /// session ceiling would be exceeded.
    pub fn claim_budget(&self, n: usize) -> bool {
        let mut current = self.resource_budget.load(Ordering::SeqCst);
        loop {
            if current < n {
                return false;
            }
            match self.resource_budget.compare_exchange(
                current,
                current - n,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Simulated resource id for dry runs.
    pub fn dry_run_id(&self, hint: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("dry-run-{hint}-{}", &suffix[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skysweep_core::LedgerHeader;

    fn context(max: usize) -> (tempfile::TempDir, WorkerContext) {
        let dir = tempfile::tempdir().unwrap();
        let session_id = SessionId::generate();
        let header = LedgerHeader {
            session_id: session_id.clone(),
            started_at: jiff::Timestamp::now(),
            user: "test".into(),
            dry_run: true,
            invocation: serde_json::Value::Null,
        };
        let ledger = Arc::new(SessionLedger::create(dir.path(), &header).unwrap());
        let ctx = WorkerContext::new(
            session_id,
            ledger,
            true,
            CancellationToken::new(),
            max,
        );
        (dir, ctx)
    }

    #[test]
    fn budget_is_claimed_atomically() {
        let (_dir, ctx) = context(10);
        assert!(ctx.claim_budget(6));
        assert!(!ctx.claim_budget(5));
        assert!(ctx.claim_budget(4));
        assert!(!ctx.claim_budget(1));
    }

    #[test]
    fn dry_run_ids_are_prefixed() {
        let (_dir, ctx) = context(1);
        let id = ctx.dry_run_id("i");
        assert!(id.starts_with("dry-run-i-"));
    }
}
