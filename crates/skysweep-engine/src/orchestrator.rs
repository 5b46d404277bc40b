//! Drives one session end to end: validated handles → plan → execute →
//! ledger → summary. The reporter consumes the summary; this module never
//! renders anything.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use skysweep_core::{CredentialHandle, LedgerEntry, LedgerHeader, SessionId};
use tokio_util::sync::CancellationToken;

use crate::context::WorkerContext;
use crate::error::EngineError;
use crate::executor::{self, ExecutorConfig};
use crate::graph::{DependencyGraph, StatusCounts};
use crate::ledger::SessionLedger;
use crate::planner::{self, Intent, PlannerConfig};
use crate::rollback;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub dry_run: bool,
    pub workers: usize,
    pub max_resources: usize,
    pub allow_production: bool,
    pub auto_rollback: bool,
    /// Directory the ledger file is written to.
    pub output_dir: PathBuf,
    pub user: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            workers: 5,
            max_resources: 50,
            allow_production: false,
            auto_rollback: false,
            output_dir: PathBuf::from("."),
            user: whoami(),
        }
    }
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub started_at: jiff::Timestamp,
    pub ended_at: jiff::Timestamp,
    pub user: String,
    pub dry_run: bool,
    pub counts: StatusCounts,
    pub cancelled: bool,
    pub entries: Vec<LedgerEntry>,
    pub ledger_path: PathBuf,
    pub rollback: Option<rollback::RollbackSummary>,
}

impl SessionSummary {
    /// Process exit code: 0 clean, 1 partial, 2 all-fail, 3 cancelled.
    /// (Configuration errors exit 4 before a summary exists.)
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            return 3;
        }
        if self.counts.failed == 0 {
            0
        } else if self.counts.succeeded > 0 {
            1
        } else {
            2
        }
    }
}

/// Run one session. `handles` must already be validated.
pub async fn run_session(
    handles: Vec<CredentialHandle>,
    intent: Intent,
    options: SessionOptions,
) -> Result<SessionSummary, EngineError> {
    let session_id = SessionId::generate();
    let started_at = jiff::Timestamp::now();

    let header = LedgerHeader {
        session_id: session_id.clone(),
        started_at,
        user: options.user.clone(),
        dry_run: options.dry_run,
        invocation: serde_json::json!({
            "intent": intent_label(&intent),
            "handles": handles.len(),
            "workers": options.workers,
            "max_resources": options.max_resources,
            "dry_run": options.dry_run,
        }),
    };
    let ledger = Arc::new(SessionLedger::create(&options.output_dir, &header)?);
    let ledger_path = ledger.path().to_path_buf();

    tracing::info!(
        session = %session_id,
        handles = handles.len(),
        intent = intent_label(&intent),
        dry_run = options.dry_run,
        "session started"
    );

    let mut graph = DependencyGraph::new();
    planner::plan(
        &mut graph,
        &handles,
        &intent,
        &PlannerConfig {
            max_resources: options.max_resources,
            allow_production: options.allow_production,
        },
    )?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling session");
            signal_cancel.cancel();
        }
    });

    let ctx = Arc::new(WorkerContext::new(
        session_id.clone(),
        Arc::clone(&ledger),
        options.dry_run,
        cancel.clone(),
        options.max_resources,
    ));

    let graph = Arc::new(Mutex::new(graph));
    let counts = executor::execute(
        Arc::clone(&graph),
        Arc::clone(&ctx),
        &ExecutorConfig {
            workers: options.workers,
        },
    )
    .await;
    signal_task.abort();

    let cancelled = cancel.is_cancelled();

    let rollback_summary = if counts.failed > 0 && options.auto_rollback && !options.dry_run {
        tracing::warn!("failures detected, auto-rollback engaged");
        match rollback::rollback_session(&options.output_dir, &session_id, &handles, &cancel).await
        {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!(error = %e, "auto-rollback failed");
                None
            }
        }
    } else {
        None
    };

    let summary = SessionSummary {
        session_id,
        started_at,
        ended_at: jiff::Timestamp::now(),
        user: options.user,
        dry_run: options.dry_run,
        counts,
        cancelled,
        entries: ledger.entries(),
        ledger_path,
        rollback: rollback_summary,
    };
    tracing::info!(
        session = %summary.session_id,
        exit_code = summary.exit_code(),
        "session finished"
    );
    Ok(summary)
}

fn intent_label(intent: &Intent) -> &'static str {
    match intent {
        Intent::Provision { .. } => "provision",
        Intent::Cleanup { .. } => "cleanup",
        Intent::CloudNuke { .. } => "cloud-nuke",
        Intent::EksAutoscalerDelete { .. } => "eks-autoscaler-delete",
        Intent::EksAuthConfigure { .. } => "eks-auth-configure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with(counts: StatusCounts, cancelled: bool) -> SessionSummary {
        SessionSummary {
            session_id: SessionId("20250801_120000_ab12".into()),
            started_at: jiff::Timestamp::now(),
            ended_at: jiff::Timestamp::now(),
            user: "ops".into(),
            dry_run: false,
            counts,
            cancelled,
            entries: Vec::new(),
            ledger_path: PathBuf::from("session_x.json"),
            rollback: None,
        }
    }

    #[test]
    fn exit_codes_reflect_worst_outcome() {
        let clean = StatusCounts {
            succeeded: 4,
            skipped: 1,
            ..Default::default()
        };
        assert_eq!(summary_with(clean, false).exit_code(), 0);

        let partial = StatusCounts {
            succeeded: 3,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(summary_with(partial, false).exit_code(), 1);

        let all_fail = StatusCounts {
            failed: 2,
            ..Default::default()
        };
        assert_eq!(summary_with(all_fail, false).exit_code(), 2);

        assert_eq!(summary_with(clean, true).exit_code(), 3);
    }
}
