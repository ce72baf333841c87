use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{string_argument, Action, Execution};
use crate::error::ActionError;
use crate::task::{TaskService, TaskValue};

/// Reports the current state of a task started by an asynchronous action.
pub struct GetTaskAction {
    tasks: Arc<dyn TaskService>,
}

impl GetTaskAction {
    pub fn new(tasks: Arc<dyn TaskService>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Action for GetTaskAction {
    fn execution(&self) -> Execution {
        Execution::Synchronous
    }

    async fn run(&self, payload: &[u8]) -> Result<Value, ActionError> {
        let id = string_argument(payload, "task id")?;
        let task = self
            .tasks
            .find_task(&id)
            .await
            .ok_or(ActionError::TaskNotFound(id))?;

        serde_json::to_value(TaskValue::from(&task))
            .map_err(|e| ActionError::execution(format!("Failed to encode task: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskRegistry, TaskState};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let action = GetTaskAction::new(Arc::new(TaskRegistry::new()));
        let err = action.run(br#"{"arguments":["57"]}"#).await.unwrap_err();
        assert_eq!(err, ActionError::TaskNotFound("57".into()));
    }

    #[tokio::test]
    async fn missing_id_is_invalid() {
        let action = GetTaskAction::new(Arc::new(TaskRegistry::new()));
        let err = action.run(br#"{"arguments":[]}"#).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn reports_terminal_state_repeatably() {
        let registry = TaskRegistry::new();
        let task = registry.start_task(Box::pin(async { Ok(json!("ok")) })).await;
        let action = GetTaskAction::new(Arc::new(registry.clone()));
        let payload = serde_json::to_vec(&json!({"arguments": [task.id.clone()]})).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let value = action.run(&payload).await.unwrap();
                if value["state"] != "running" {
                    return value;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(first, json!({"agent_task_id": task.id.clone(), "state": "done"}));
        // Polling again has no side effects
        assert_eq!(action.run(&payload).await.unwrap(), first);
        assert_eq!(
            registry.find_task(&task.id).await.unwrap().state,
            TaskState::Done
        );
    }
}
