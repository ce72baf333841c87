use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{Action, Execution};
use crate::apply_spec::{ApplySpec, SpecStore};
use crate::error::ActionError;
use crate::mbus::parse_arguments;

/// Records a new deployment spec for this node.
pub struct ApplyAction {
    specs: Arc<SpecStore>,
}

impl ApplyAction {
    pub fn new(specs: Arc<SpecStore>) -> Self {
        Self { specs }
    }
}

#[async_trait]
impl Action for ApplyAction {
    fn execution(&self) -> Execution {
        Execution::Asynchronous
    }

    async fn run(&self, payload: &[u8]) -> Result<Value, ActionError> {
        let raw = parse_arguments(payload)?
            .into_iter()
            .next()
            .filter(Value::is_object)
            .ok_or_else(|| {
                ActionError::InvalidArguments("expected spec object as first argument".into())
            })?;

        let spec = ApplySpec::from_value(raw)
            .map_err(|e| ActionError::InvalidArguments(format!("malformed spec: {e}")))?;

        info!(job = %spec.job_name(), index = ?spec.index, "Applying spec");
        self.specs.replace(spec).await;

        Ok(Value::String("applied".into()))
    }
}
