//! Tracking of asynchronous action runs.
//!
//! The registry owns the concurrency boundary: it allocates the id, spawns
//! the work and writes the outcome back. Callers only ever read records.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::ActionError;

/// Deferred unit of work handed to the registry.
pub type TaskWork = Pin<Box<dyn Future<Output = Result<Value, ActionError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Done,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of a tracked task.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    /// Result payload, set once the task is `Done`.
    pub value: Option<Value>,
    /// Failure message, set once the task is `Failed`.
    pub error: Option<String>,
}

impl Task {
    fn running(id: String) -> Self {
        Self {
            id,
            state: TaskState::Running,
            value: None,
            error: None,
        }
    }
}

/// Wire view of a task: `{"agent_task_id": ..., "state": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskValue {
    pub agent_task_id: String,
    pub state: TaskState,
}

impl From<&Task> for TaskValue {
    fn from(task: &Task) -> Self {
        Self {
            agent_task_id: task.id.clone(),
            state: task.state,
        }
    }
}

#[async_trait]
pub trait TaskService: Send + Sync {
    /// Register a `Running` task and schedule `work` in the background.
    ///
    /// Returns without waiting for `work`.
    async fn start_task(&self, work: TaskWork) -> Task;

    /// Look up a task by id. No side effects.
    async fn find_task(&self, id: &str) -> Option<Task>;
}

/// In-memory task store. Records live for the registry's lifetime.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    next_id: Arc<AtomicU64>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Apply the single legal `Running` -> terminal transition.
    async fn complete(&self, id: &str, outcome: Result<Value, ActionError>) {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(id) else {
            warn!(task = %id, "Completed task is not registered");
            return;
        };
        if task.state != TaskState::Running {
            warn!(task = %id, state = %task.state, "Ignoring second completion");
            return;
        }

        match outcome {
            Ok(value) => {
                task.state = TaskState::Done;
                task.value = Some(value);
            }
            Err(e) => {
                task.state = TaskState::Failed;
                task.error = Some(e.to_string());
            }
        }
        debug!(task = %id, state = %task.state, "Task finished");
    }
}

#[async_trait]
impl TaskService for TaskRegistry {
    async fn start_task(&self, work: TaskWork) -> Task {
        let task = Task::running(self.allocate_id());

        // Insert before spawning so the completion always finds the record
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());

        let registry = self.clone();
        let id = task.id.clone();
        tokio::spawn(async move {
            // Run on a nested task so a panicking action still fails its record
            let outcome = tokio::spawn(work).await.unwrap_or_else(|e| {
                Err(ActionError::execution(format!("action panicked: {e}")))
            });
            registry.complete(&id, outcome).await;
        });

        debug!(task = %task.id, "Started task");
        task
    }

    async fn find_task(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn wait_terminal(registry: &TaskRegistry, id: &str) -> Task {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let task = registry.find_task(id).await.unwrap();
                if task.state != TaskState::Running {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("task should reach a terminal state")
    }

    #[tokio::test]
    async fn start_returns_before_work_completes() {
        let registry = TaskRegistry::new();
        let (release, gate) = oneshot::channel::<()>();

        let task = registry
            .start_task(Box::pin(async move {
                let _ = gate.await;
                Ok(json!("finished"))
            }))
            .await;

        assert_eq!(task.state, TaskState::Running);
        assert_eq!(registry.find_task(&task.id).await.unwrap().state, TaskState::Running);

        release.send(()).unwrap();
        let done = wait_terminal(&registry, &task.id).await;
        assert_eq!(done.state, TaskState::Done);
        assert_eq!(done.value, Some(json!("finished")));
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn failed_work_records_error() {
        let registry = TaskRegistry::new();
        let task = registry
            .start_task(Box::pin(async { Err(ActionError::execution("disk full")) }))
            .await;

        let failed = wait_terminal(&registry, &task.id).await;
        assert_eq!(failed.state, TaskState::Failed);
        assert_eq!(failed.error.as_deref(), Some("disk full"));
        assert!(failed.value.is_none());
    }

    async fn explode() -> Result<Value, ActionError> {
        panic!("boom")
    }

    #[tokio::test]
    async fn panicking_work_fails_only_its_task() {
        let registry = TaskRegistry::new();
        let bad = registry.start_task(Box::pin(explode())).await;
        let good = registry
            .start_task(Box::pin(async { Ok(json!(1)) }))
            .await;

        let bad = wait_terminal(&registry, &bad.id).await;
        assert_eq!(bad.state, TaskState::Failed);
        assert!(bad.error.unwrap().contains("action panicked"));

        let good = wait_terminal(&registry, &good.id).await;
        assert_eq!(good.state, TaskState::Done);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let registry = TaskRegistry::new();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            let task = registry.start_task(Box::pin(async { Ok(Value::Null) })).await;
            assert!(ids.insert(task.id));
        }
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let registry = TaskRegistry::new();
        assert!(registry.find_task("57").await.is_none());
    }

    #[tokio::test]
    async fn second_completion_is_ignored() {
        let registry = TaskRegistry::new();
        let task = registry.start_task(Box::pin(async { Ok(json!("first")) })).await;
        let done = wait_terminal(&registry, &task.id).await;

        registry
            .complete(&task.id, Err(ActionError::execution("late")))
            .await;
        assert_eq!(registry.find_task(&task.id).await.unwrap(), done);
    }

    #[test]
    fn task_value_wire_shape() {
        let task = Task {
            id: "found-57-id".into(),
            state: TaskState::Done,
            value: Some(json!("ignored")),
            error: None,
        };
        assert_eq!(
            serde_json::to_string(&TaskValue::from(&task)).unwrap(),
            r#"{"agent_task_id":"found-57-id","state":"done"}"#
        );
    }

    #[test]
    fn state_wire_names() {
        assert_eq!(serde_json::to_string(&TaskState::Running).unwrap(), r#""running""#);
        assert_eq!(serde_json::to_string(&TaskState::Done).unwrap(), r#""done""#);
        assert_eq!(serde_json::to_string(&TaskState::Failed).unwrap(), r#""failed""#);
    }
}
