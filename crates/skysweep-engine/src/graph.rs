//! Dependency-ordered task store shared by the planner and the executor.
//!
//! Hard edges gate readiness and propagate failure; soft edges only gate
//! readiness (used where the dependency is expected to outlive failure, like
//! the default security group).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use skysweep_core::task::SkipReason;
use skysweep_core::{Task, TaskId, TaskOutcome, TaskStatus};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.failed + self.skipped
    }

    pub fn terminal(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

#[derive(Default)]
pub struct DependencyGraph {
    tasks: HashMap<TaskId, Task>,
    /// Reverse hard edges: dependency -> dependents.
    dependents: HashMap<TaskId, Vec<TaskId>>,
    /// Insertion order, for deterministic tie-breaking.
    order: Vec<TaskId>,
    skip_reasons: HashMap<TaskId, SkipReason>,
    next_id: AtomicU64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a task whose `depends_on`/`soft_depends_on` are already set.
    pub fn insert(&mut self, task: Task) {
        for dep in &task.depends_on {
            self.dependents.entry(*dep).or_default().push(task.id);
        }
        self.order.push(task.id);
        self.tasks.insert(task.id, task);
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn satisfied(&self, task: &Task) -> bool {
        let hard_ok = task.depends_on.iter().all(|dep| {
            matches!(
                self.tasks.get(dep).map(|t| t.status),
                Some(TaskStatus::Succeeded) | Some(TaskStatus::Skipped) | None
            )
        });
        // Soft dependencies only need to be out of the way.
        let soft_ok = task.soft_depends_on.iter().all(|dep| {
            !matches!(
                self.tasks.get(dep).map(|t| t.status),
                Some(TaskStatus::Pending) | Some(TaskStatus::Running)
            )
        });
        hard_ok && soft_ok
    }

    /// Pending tasks whose dependencies are satisfied, ordered by
    /// (priority descending, creation order ascending).
    pub fn ready(&self) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self
            .order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.status == TaskStatus::Pending && self.satisfied(t))
            .collect();
        ready.sort_by(|a, b| b.priority().cmp(&a.priority()).then(a.id.cmp(&b.id)));
        ready.iter().map(|t| t.id).collect()
    }

    /// Transition a ready task to running and return a working copy.
    ///
    /// Returns `None` if the task is not pending or its dependencies are not
    /// satisfied; the invariant that running tasks have satisfied hard
    /// dependencies is enforced here, not at call sites.
    pub fn start(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.get(&id)?;
        if task.status != TaskStatus::Pending || !self.satisfied(task) {
            return None;
        }
        let task = self.tasks.get_mut(&id)?;
        task.status = TaskStatus::Running;
        task.attempts += 1;
        Some(task.clone())
    }

    /// Record a task outcome and propagate: a failure (or cancellation)
    /// skips every transitive hard dependent with reason `parent-failed`.
    pub fn complete(&mut self, id: TaskId, outcome: &TaskOutcome) {
        let status = match outcome {
            TaskOutcome::Succeeded => TaskStatus::Succeeded,
            TaskOutcome::Failed(_) | TaskOutcome::TimedOut => TaskStatus::Failed,
            TaskOutcome::Cancelled => TaskStatus::Skipped,
        };
        if let Some(task) = self.tasks.get_mut(&id) {
            task.status = status;
            if matches!(outcome, TaskOutcome::Cancelled) {
                self.skip_reasons.insert(id, SkipReason::Cancelled);
            }
        }

        if status == TaskStatus::Failed {
            self.skip_dependents_of(id);
        }
    }

    fn skip_dependents_of(&mut self, id: TaskId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let dependents = self.dependents.get(&current).cloned().unwrap_or_default();
            for dependent in dependents {
                if let Some(task) = self.tasks.get_mut(&dependent) {
                    if task.status == TaskStatus::Pending {
                        task.status = TaskStatus::Skipped;
                        self.skip_reasons.insert(dependent, SkipReason::ParentFailed);
                        tracing::debug!(task = %dependent, "skipped: parent failed");
                        stack.push(dependent);
                    }
                }
            }
        }
    }

    /// Skip every pending task (cancellation path).
    pub fn skip_all_pending(&mut self, reason: SkipReason) {
        for task in self.tasks.values_mut() {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Skipped;
                self.skip_reasons.insert(task.id, reason);
            }
        }
    }

    pub fn skip_reason(&self, id: TaskId) -> Option<SkipReason> {
        self.skip_reasons.get(&id).copied()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Succeeded => counts.succeeded += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skysweep_core::{CredentialHandle, CredentialKind, TaskKind};

    fn handle() -> CredentialHandle {
        CredentialHandle {
            account_name: "account01".into(),
            account_id: "111111111111".into(),
            email: "a@x.com".into(),
            access_key: "AK".into(),
            secret_key: "SK".into(),
            kind: CredentialKind::Root,
            username: None,
            regions: vec!["us-east-1".into()],
        }
    }

    fn graph_with(kinds: Vec<TaskKind>) -> (DependencyGraph, Vec<TaskId>) {
        let mut graph = DependencyGraph::new();
        let mut ids = Vec::new();
        for kind in kinds {
            let id = graph.allocate_id();
            graph.insert(Task::new(id, kind, handle(), "us-east-1".into()));
            ids.push(id);
        }
        (graph, ids)
    }

    fn terminate_kind(n: u32) -> TaskKind {
        TaskKind::TerminateInstance {
            instance_id: format!("i-{n}"),
            security_groups: vec![],
        }
    }

    #[test]
    fn ready_respects_dependencies() {
        let (mut graph, ids) = graph_with(vec![terminate_kind(1)]);
        let sg = graph.allocate_id();
        let mut task = Task::new(
            sg,
            TaskKind::DeleteSecurityGroup {
                group_id: "sg-1".into(),
                group_name: "web".into(),
            },
            handle(),
            "us-east-1".into(),
        );
        task.depends_on.push(ids[0]);
        graph.insert(task);

        assert_eq!(graph.ready(), vec![ids[0]]);
        graph.start(ids[0]).unwrap();
        graph.complete(ids[0], &TaskOutcome::Succeeded);
        assert_eq!(graph.ready(), vec![sg]);
    }

    #[test]
    fn start_refuses_unsatisfied_task() {
        let (mut graph, ids) = graph_with(vec![terminate_kind(1)]);
        let dependent = graph.allocate_id();
        let mut task = Task::new(dependent, terminate_kind(2), handle(), "us-east-1".into());
        task.depends_on.push(ids[0]);
        graph.insert(task);

        assert!(graph.start(dependent).is_none());
        assert!(graph.start(ids[0]).is_some());
    }

    #[test]
    fn failure_skips_transitive_dependents() {
        let (mut graph, ids) = graph_with(vec![terminate_kind(1)]);
        let mid = graph.allocate_id();
        let mut task = Task::new(mid, terminate_kind(2), handle(), "us-east-1".into());
        task.depends_on.push(ids[0]);
        graph.insert(task);
        let leaf = graph.allocate_id();
        let mut task = Task::new(leaf, terminate_kind(3), handle(), "us-east-1".into());
        task.depends_on.push(mid);
        graph.insert(task);

        graph.start(ids[0]).unwrap();
        graph.complete(ids[0], &TaskOutcome::Failed("boom".into()));

        assert_eq!(graph.get(mid).unwrap().status, TaskStatus::Skipped);
        assert_eq!(graph.get(leaf).unwrap().status, TaskStatus::Skipped);
        assert_eq!(graph.skip_reason(mid), Some(SkipReason::ParentFailed));
        assert!(graph.counts().terminal());
    }

    #[test]
    fn skipped_dependency_still_satisfies_dependents() {
        // A skipped dependency satisfies its dependents just like success.
        let (mut graph, ids) = graph_with(vec![terminate_kind(1)]);
        let dependent = graph.allocate_id();
        let mut task = Task::new(dependent, terminate_kind(2), handle(), "us-east-1".into());
        task.depends_on.push(ids[0]);
        graph.insert(task);

        graph.start(ids[0]).unwrap();
        graph.complete(ids[0], &TaskOutcome::Cancelled);
        assert_eq!(graph.get(ids[0]).unwrap().status, TaskStatus::Skipped);
        assert_eq!(graph.ready(), vec![dependent]);
    }

    #[test]
    fn soft_dependency_orders_but_does_not_propagate() {
        let (mut graph, ids) = graph_with(vec![terminate_kind(1)]);
        let dependent = graph.allocate_id();
        let mut task = Task::new(dependent, terminate_kind(2), handle(), "us-east-1".into());
        task.soft_depends_on.push(ids[0]);
        graph.insert(task);

        assert_eq!(graph.ready(), vec![ids[0]]);
        graph.start(ids[0]).unwrap();
        graph.complete(ids[0], &TaskOutcome::Failed("boom".into()));

        // Dependent becomes ready despite the failed soft dependency.
        assert_eq!(graph.ready(), vec![dependent]);
    }

    #[test]
    fn priority_orders_ready_queue() {
        let mut graph = DependencyGraph::new();
        let create = graph.allocate_id();
        graph.insert(Task::new(
            create,
            TaskKind::CreateEc2 {
                instance_type: "m5.xlarge".into(),
                ami_id: "ami-1".into(),
            },
            handle(),
            "us-east-1".into(),
        ));
        let delete = graph.allocate_id();
        graph.insert(Task::new(
            delete,
            TaskKind::DeleteBucket {
                bucket: "b".into(),
            },
            handle(),
            "us-east-1".into(),
        ));
        let clear = graph.allocate_id();
        graph.insert(Task::new(
            clear,
            TaskKind::ClearSecurityGroupRules {
                group_id: "sg-1".into(),
            },
            handle(),
            "us-east-1".into(),
        ));

        assert_eq!(graph.ready(), vec![clear, delete, create]);
    }

    #[test]
    fn skip_all_pending_marks_cancelled() {
        let (mut graph, ids) = graph_with(vec![terminate_kind(1), terminate_kind(2)]);
        graph.skip_all_pending(SkipReason::Cancelled);
        for id in ids {
            assert_eq!(graph.get(id).unwrap().status, TaskStatus::Skipped);
            assert_eq!(graph.skip_reason(id), Some(SkipReason::Cancelled));
        }
    }
}
