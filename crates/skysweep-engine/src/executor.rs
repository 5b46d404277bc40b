//! Bounded worker pool draining the ready queue of the dependency graph.
//!
//! Workers are cooperative: each locks the graph, claims one ready task,
//! executes it without holding the lock, then records the outcome and wakes
//! the others. When nothing is ready but tasks are still running, workers
//! park on a `Notify` signaled by every completion. Discovery tasks may
//! insert follow-up tasks; those are budget-checked against the session
//! resource ceiling before insertion.

use std::sync::{Arc, Mutex};

use skysweep_core::task::SkipReason;
use skysweep_core::{Task, TaskKind, TaskOutcome};
use tokio::sync::Notify;

use crate::context::WorkerContext;
use crate::dispatch;
use crate::graph::{DependencyGraph, StatusCounts};

/// A task the executor should enqueue after its parent succeeds. Edges refer
/// to other follow-ups in the same batch by index; the executor resolves them
/// to real task ids at insertion.
#[derive(Debug)]
pub struct FollowUp {
    pub kind: TaskKind,
    pub depends_on_local: Vec<usize>,
    pub soft_depends_on_local: Vec<usize>,
}

impl FollowUp {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            depends_on_local: Vec::new(),
            soft_depends_on_local: Vec::new(),
        }
    }

    pub fn after(mut self, local_index: usize) -> Self {
        self.depends_on_local.push(local_index);
        self
    }

    pub fn soft_after(mut self, local_index: usize) -> Self {
        self.soft_depends_on_local.push(local_index);
        self
    }
}

/// Outcome of one task execution plus any tasks it spawned.
#[derive(Debug)]
pub struct TaskExecution {
    pub outcome: TaskOutcome,
    pub follow_ups: Vec<FollowUp>,
}

impl TaskExecution {
    pub fn done(outcome: TaskOutcome) -> Self {
        Self {
            outcome,
            follow_ups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub workers: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { workers: 5 }
    }
}

/// Run the graph to completion and return the final counts.
pub async fn execute(
    graph: Arc<Mutex<DependencyGraph>>,
    ctx: Arc<WorkerContext>,
    config: &ExecutorConfig,
) -> StatusCounts {
    let workers = config.workers.clamp(1, 20);
    let notify = Arc::new(Notify::new());

    let mut joins = Vec::with_capacity(workers);
    for worker in 0..workers {
        let graph = Arc::clone(&graph);
        let ctx = Arc::clone(&ctx);
        let notify = Arc::clone(&notify);
        joins.push(tokio::spawn(async move {
            worker_loop(worker, graph, ctx, notify).await;
        }));
    }
    for join in joins {
        let _ = join.await;
    }

    let counts = graph.lock().expect("graph lock").counts();
    tracing::info!(
        succeeded = counts.succeeded,
        failed = counts.failed,
        skipped = counts.skipped,
        "execution finished"
    );
    counts
}

async fn worker_loop(
    worker: usize,
    graph: Arc<Mutex<DependencyGraph>>,
    ctx: Arc<WorkerContext>,
    notify: Arc<Notify>,
) {
    loop {
        if ctx.cancel.is_cancelled() {
            let mut g = graph.lock().expect("graph lock");
            g.skip_all_pending(SkipReason::Cancelled);
            drop(g);
            notify.notify_waiters();
            return;
        }

        let claimed: Option<Task> = {
            let mut g = graph.lock().expect("graph lock");
            g.ready().first().copied().and_then(|id| g.start(id))
        };

        match claimed {
            Some(task) => {
                tracing::info!(
                    worker,
                    task = %task.id,
                    kind = task.kind.label(),
                    account = %task.handle.account_name,
                    region = %task.region,
                    "task started"
                );

                let execution = run_with_deadline(&ctx, &task).await;

                let mut g = graph.lock().expect("graph lock");
                if matches!(execution.outcome, TaskOutcome::Succeeded)
                    && !execution.follow_ups.is_empty()
                {
                    insert_follow_ups(&mut g, &ctx, &task, execution.follow_ups);
                }
                match &execution.outcome {
                    TaskOutcome::Succeeded => {
                        tracing::info!(worker, task = %task.id, "task succeeded")
                    }
                    TaskOutcome::Failed(reason) => {
                        tracing::error!(worker, task = %task.id, reason = %reason, "task failed")
                    }
                    TaskOutcome::TimedOut => {
                        tracing::error!(worker, task = %task.id, "task deadline exceeded")
                    }
                    TaskOutcome::Cancelled => {
                        tracing::warn!(worker, task = %task.id, "task cancelled")
                    }
                }
                g.complete(task.id, &execution.outcome);
                drop(g);
                notify.notify_waiters();
            }
            None => {
                {
                    let g = graph.lock().expect("graph lock");
                    if g.counts().terminal() {
                        drop(g);
                        notify.notify_waiters();
                        return;
                    }
                }
                // Another worker may finish and unblock us; re-check
                // periodically in case of a missed wakeup.
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(std::time::Duration::from_millis(250)) => {}
                    _ = ctx.cancel.cancelled() => {}
                }
            }
        }
    }
}

async fn run_with_deadline(ctx: &Arc<WorkerContext>, task: &Task) -> TaskExecution {
    tokio::select! {
        _ = ctx.cancel.cancelled() => TaskExecution::done(TaskOutcome::Cancelled),
        result = tokio::time::timeout(ctx.task_deadline, dispatch::run_task(ctx, task)) => {
            match result {
                Ok(execution) => execution,
                Err(_) => TaskExecution::done(TaskOutcome::TimedOut),
            }
        }
    }
}

fn insert_follow_ups(
    graph: &mut DependencyGraph,
    ctx: &WorkerContext,
    parent: &Task,
    follow_ups: Vec<FollowUp>,
) {
    if !ctx.claim_budget(follow_ups.len()) {
        tracing::error!(
            parent = %parent.id,
            discovered = follow_ups.len(),
            "resource ceiling reached, discovered resources will not be processed"
        );
        return;
    }

    let ids: Vec<_> = follow_ups.iter().map(|_| graph.allocate_id()).collect();
    for (index, follow_up) in follow_ups.into_iter().enumerate() {
        let mut task = Task::new(
            ids[index],
            follow_up.kind,
            parent.handle.clone(),
            parent.region.clone(),
        );
        task.depends_on = follow_up
            .depends_on_local
            .iter()
            .map(|local| ids[*local])
            .collect();
        task.soft_depends_on = follow_up
            .soft_depends_on_local
            .iter()
            .map(|local| ids[*local])
            .collect();
        graph.insert(task);
    }
}
