use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{Action, Execution};
use crate::apply_spec::SpecStore;
use crate::config::Settings;
use crate::error::ActionError;
use crate::mbus::JobState;

/// Agent identity and the job it currently runs.
pub struct GetStateAction {
    settings: Arc<Settings>,
    specs: Arc<SpecStore>,
}

#[derive(Debug, Serialize)]
struct StateValue<'a> {
    agent_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<u32>,
    job_state: JobState,
}

impl GetStateAction {
    pub fn new(settings: Arc<Settings>, specs: Arc<SpecStore>) -> Self {
        Self { settings, specs }
    }
}

#[async_trait]
impl Action for GetStateAction {
    fn execution(&self) -> Execution {
        Execution::Synchronous
    }

    async fn run(&self, _payload: &[u8]) -> Result<Value, ActionError> {
        let spec = self.specs.current().await;
        let state = StateValue {
            agent_id: &self.settings.agent_id,
            job: spec.job.as_ref().map(|j| j.name.as_str()),
            index: spec.index,
            job_state: JobState::Running,
        };

        serde_json::to_value(state)
            .map_err(|e| ActionError::execution(format!("Failed to encode state: {e}")))
    }
}
