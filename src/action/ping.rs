use async_trait::async_trait;
use serde_json::Value;

use super::{Action, Execution};
use crate::error::ActionError;

/// Liveness probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingAction;

#[async_trait]
impl Action for PingAction {
    fn execution(&self) -> Execution {
        Execution::Synchronous
    }

    async fn run(&self, _payload: &[u8]) -> Result<Value, ActionError> {
        Ok(Value::String("pong".into()))
    }
}
