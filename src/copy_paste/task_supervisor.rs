//! Task supervisor (§4.6): a registry of long-running operations with
//! per-task state machines and a cross-task resource-conflict index.
//!
//! Reimplements the "cyclic references" pattern called out in §9 design
//! notes as explicit ownership: the supervisor owns the task set and the
//! subscription handles; tasks hold only a write handle to their own
//! event channel. Notification is message passing, never a direct
//! back-reference into the supervisor.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

/// {clusterId, databaseName?, collectionName?} (§3). Two descriptors
/// conflict when every level specified on one side matches the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    pub cluster_id: String,
    pub database_name: Option<String>,
    pub collection_name: Option<String>,
}

impl ResourceDescriptor {
    pub fn cluster(cluster_id: impl Into<String>) -> Self {
        ResourceDescriptor {
            cluster_id: cluster_id.into(),
            database_name: None,
            collection_name: None,
        }
    }

    pub fn database(cluster_id: impl Into<String>, database_name: impl Into<String>) -> Self {
        ResourceDescriptor {
            cluster_id: cluster_id.into(),
            database_name: Some(database_name.into()),
            collection_name: None,
        }
    }

    pub fn collection(
        cluster_id: impl Into<String>,
        database_name: impl Into<String>,
        collection_name: impl Into<String>,
    ) -> Self {
        ResourceDescriptor {
            cluster_id: cluster_id.into(),
            database_name: Some(database_name.into()),
            collection_name: Some(collection_name.into()),
        }
    }

    /// Two descriptors conflict when every level specified on one side
    /// matches the other (§3, §4.6).
    pub fn conflicts_with(&self, other: &ResourceDescriptor) -> bool {
        if self.cluster_id != other.cluster_id {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.database_name, &other.database_name) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.collection_name, &other.collection_name) {
            if a != b {
                return false;
            }
        }
        true
    }
}

/// Task lifecycle (§3): `Pending -> Initializing -> (Running|Stopping)`,
/// `Running -> (Stopping|Completed|Failed)`, `Stopping -> (Stopped|Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Initializing,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Stopped | TaskState::Completed | TaskState::Failed)
    }

    fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Initializing)
                | (Initializing, Running)
                | (Initializing, Stopping)
                | (Running, Stopping)
                | (Running, Completed)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub progress_percent: Option<f32>,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid task transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// A single supervised task. Cloning shares the same state and resource
/// set (it's a handle, not a copy of the task).
pub struct Task {
    id: Uuid,
    resources: Vec<ResourceDescriptor>,
    status_tx: watch::Sender<TaskStatus>,
    status_rx: watch::Receiver<TaskStatus>,
    cancel_handle: crate::cancel::CancelHandle,
    created_at: DateTime<Utc>,
}

impl Task {
    fn new(resources: Vec<ResourceDescriptor>, cancel_handle: crate::cancel::CancelHandle) -> Self {
        let (status_tx, status_rx) = watch::channel(TaskStatus {
            state: TaskState::Pending,
            progress_percent: None,
        });
        Task {
            id: Uuid::new_v4(),
            resources,
            status_tx,
            status_rx,
            cancel_handle,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When this task was registered with its supervisor, for
    /// diagnostics and the age reported in `/tasks` style listings.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> TaskStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status_rx.clone()
    }

    pub fn used_resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    fn transition(&self, to: TaskState) -> Result<(), InvalidTransition> {
        let from = self.status_rx.borrow().state;
        if !from.can_transition_to(to) {
            return Err(InvalidTransition { from, to });
        }
        let progress_percent = if to == TaskState::Running {
            Some(0.0)
        } else if from == TaskState::Running {
            self.status_rx.borrow().progress_percent
        } else {
            None
        };
        let _ = self.status_tx.send(TaskStatus { state: to, progress_percent });
        tracing::debug!(
            task_id = %self.id,
            ?from,
            ?to,
            age_ms = (Utc::now() - self.created_at).num_milliseconds(),
            "task state transition"
        );
        Ok(())
    }

    /// Progress updates are silently dropped unless `state == Running`
    /// (§4.6).
    pub fn report_progress(&self, percent: f32) {
        let current = *self.status_rx.borrow();
        if current.state == TaskState::Running {
            let _ = self.status_tx.send(TaskStatus {
                state: TaskState::Running,
                progress_percent: Some(percent),
            });
        }
    }

    /// `stop()` is idempotent on terminal states; it only signals
    /// cancellation — the final transition is performed by the running
    /// task itself once it observes cancellation (§4.6).
    pub fn stop(&self) {
        if self.status().state.is_terminal() {
            return;
        }
        self.cancel_handle.cancel();
        // Stopping is reachable from Initializing or Running; ignore a
        // transition error from any other non-terminal state (e.g.
        // Pending, which hasn't started yet and has nothing to cancel).
        let _ = self.transition(TaskState::Stopping);
    }
}

/// Template-method task driver (§4.6): validates Pending -> Initializing,
/// runs the optional init hook (respecting cancellation), transitions to
/// Running, runs the work, and transitions to the terminal state implied
/// by the work's outcome.
pub async fn run_task<Init, InitFut, Work, WorkFut, T, E>(
    task: &Task,
    cancel: crate::cancel::CancelToken,
    on_initialize: Option<Init>,
    work: Work,
) -> Result<T, TaskRunError<E>>
where
    Init: FnOnce(crate::cancel::CancelToken) -> InitFut,
    InitFut: std::future::Future<Output = Result<(), E>>,
    Work: FnOnce(crate::cancel::CancelToken) -> WorkFut,
    WorkFut: std::future::Future<Output = Result<T, E>>,
{
    task.transition(TaskState::Initializing)
        .map_err(TaskRunError::InvalidTransition)?;

    if let Some(init) = on_initialize {
        if cancel.is_cancelled() {
            let _ = task.transition(TaskState::Stopped);
            return Err(TaskRunError::Cancelled);
        }
        if let Err(e) = init(cancel.clone()).await {
            let _ = task.transition(TaskState::Failed);
            return Err(TaskRunError::Work(e));
        }
    }

    if cancel.is_cancelled() {
        let _ = task.transition(TaskState::Stopping);
        let _ = task.transition(TaskState::Stopped);
        return Err(TaskRunError::Cancelled);
    }

    task.transition(TaskState::Running)
        .map_err(TaskRunError::InvalidTransition)?;

    match work(cancel.clone()).await {
        Ok(value) => {
            let _ = task.transition(TaskState::Completed);
            Ok(value)
        }
        Err(e) => {
            if cancel.is_cancelled() {
                let _ = task.transition(TaskState::Stopping);
                let _ = task.transition(TaskState::Stopped);
                Err(TaskRunError::Cancelled)
            } else {
                let _ = task.transition(TaskState::Failed);
                Err(TaskRunError::Work(e))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaskRunError<E> {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("task cancelled")]
    Cancelled,
    #[error("task failed: {0}")]
    Work(E),
}

/// Registry of active tasks plus the resource-conflict index (§4.6).
#[derive(Clone, Default)]
pub struct TaskSupervisor {
    tasks: Arc<Mutex<HashMap<Uuid, Arc<Task>>>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor::default()
    }

    pub async fn register(
        &self,
        resources: Vec<ResourceDescriptor>,
    ) -> (Arc<Task>, crate::cancel::CancelToken) {
        let (handle, token) = crate::cancel::cancel_pair();
        let task = Arc::new(Task::new(resources, handle));
        self.tasks.lock().await.insert(task.id(), task.clone());
        (task, token)
    }

    pub async fn remove(&self, id: Uuid) {
        self.tasks.lock().await.remove(&id);
    }

    /// Iterates active (non-terminal) tasks, returning those whose
    /// resources conflict with `candidate`.
    pub async fn find_conflicting_tasks(&self, candidate: &ResourceDescriptor) -> Vec<Uuid> {
        let tasks = self.tasks.lock().await;
        tasks
            .values()
            .filter(|t| !t.status().state.is_terminal())
            .filter(|t| t.used_resources().iter().any(|r| r.conflicts_with(candidate)))
            .map(|t| t.id())
            .collect()
    }

    /// Cluster-level mass conflict check across several candidate
    /// connections; deduplicates by task id (§4.6).
    pub async fn find_conflicting_tasks_for_connections(
        &self,
        candidates: &[ResourceDescriptor],
    ) -> Vec<Uuid> {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        for candidate in candidates {
            for id in self.find_conflicting_tasks(candidate).await {
                if seen.insert(id) {
                    result.push(id);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_conflict_requires_all_specified_levels_to_match() {
        let cluster_only = ResourceDescriptor::cluster("c1");
        let collection = ResourceDescriptor::collection("c1", "db", "coll");
        assert!(cluster_only.conflicts_with(&collection));

        let other_db = ResourceDescriptor::database("c1", "other");
        assert!(!collection.conflicts_with(&other_db));

        let different_cluster = ResourceDescriptor::cluster("c2");
        assert!(!cluster_only.conflicts_with(&different_cluster));
    }

    #[tokio::test]
    async fn task_lifecycle_follows_the_state_graph() {
        let supervisor = TaskSupervisor::new();
        let (task, cancel) = supervisor.register(vec![ResourceDescriptor::cluster("c1")]).await;
        assert_eq!(task.status().state, TaskState::Pending);
        assert!(Utc::now() >= task.created_at());

        let result: Result<(), TaskRunError<()>> = run_task(
            &task,
            cancel,
            None::<fn(crate::cancel::CancelToken) -> std::future::Ready<Result<(), ()>>>,
            |_cancel| async { Ok(()) },
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(task.status().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn progress_updates_are_dropped_outside_running() {
        let supervisor = TaskSupervisor::new();
        let (task, _cancel) = supervisor.register(vec![]).await;
        task.report_progress(50.0);
        assert_eq!(task.status().progress_percent, None);
    }

    #[tokio::test]
    async fn stop_is_idempotent_once_terminal() {
        let supervisor = TaskSupervisor::new();
        let (task, cancel) = supervisor.register(vec![]).await;
        let _: Result<(), TaskRunError<()>> = run_task(
            &task,
            cancel,
            None::<fn(crate::cancel::CancelToken) -> std::future::Ready<Result<(), ()>>>,
            |_cancel| async { Ok(()) },
        )
        .await;
        assert_eq!(task.status().state, TaskState::Completed);
        task.stop();
        assert_eq!(task.status().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn conflicting_tasks_are_found_and_deduplicated_across_connections() {
        let supervisor = TaskSupervisor::new();
        let (task, _cancel) = supervisor
            .register(vec![ResourceDescriptor::collection("c1", "db", "coll")])
            .await;

        let candidates = vec![
            ResourceDescriptor::database("c1", "db"),
            ResourceDescriptor::collection("c1", "db", "coll"),
        ];
        let conflicts = supervisor.find_conflicting_tasks_for_connections(&candidates).await;
        assert_eq!(conflicts, vec![task.id()]);
    }
}
