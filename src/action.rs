//! Pluggable actions and the method-name dispatcher.
//!
//! A method name maps to a constructor producing a fresh action instance.
//! Constructing an action never runs it; the agent decides how to run it
//! from the action's execution class.

mod apply;
mod get_state;
mod get_task;
mod ping;

pub use apply::ApplyAction;
pub use get_state::GetStateAction;
pub use get_task::GetTaskAction;
pub use ping::PingAction;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::apply_spec::SpecStore;
use crate::config::Settings;
use crate::error::ActionError;
use crate::task::TaskService;

/// How the agent runs an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Run to completion before responding.
    Synchronous,
    /// Run in the background, tracked as a task.
    Asynchronous,
}

/// A unit of work invoked by method name.
#[async_trait]
pub trait Action: Send + Sync {
    fn execution(&self) -> Execution;

    /// Run against the raw request payload.
    async fn run(&self, payload: &[u8]) -> Result<Value, ActionError>;
}

/// Resolves method names to action instances.
pub trait ActionFactory: Send + Sync {
    /// Build a fresh action for `method`. Matching is exact and case-sensitive.
    fn create(&self, method: &str) -> Result<Arc<dyn Action>, ActionError>;
}

type Constructor = Box<dyn Fn() -> Arc<dyn Action> + Send + Sync>;

/// Method name -> constructor table.
#[derive(Default)]
pub struct ActionRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in agent actions.
    pub fn with_defaults(
        settings: Arc<Settings>,
        tasks: Arc<dyn TaskService>,
        specs: Arc<SpecStore>,
    ) -> Self {
        let mut registry = Self::new();

        registry.register("ping", || Arc::new(PingAction));
        registry.register("get_task", move || {
            Arc::new(GetTaskAction::new(Arc::clone(&tasks)))
        });
        {
            let specs = Arc::clone(&specs);
            registry.register("get_state", move || {
                Arc::new(GetStateAction::new(Arc::clone(&settings), Arc::clone(&specs)))
            });
        }
        registry.register("apply", move || Arc::new(ApplyAction::new(Arc::clone(&specs))));

        registry
    }

    /// Register (or replace) the constructor for `method`.
    pub fn register<F>(&mut self, method: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn Action> + Send + Sync + 'static,
    {
        self.constructors.insert(method.into(), Box::new(constructor));
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Execution class of `method`, without running anything.
    pub fn execution(&self, method: &str) -> Result<Execution, ActionError> {
        self.create(method).map(|action| action.execution())
    }
}

impl ActionFactory for ActionRegistry {
    fn create(&self, method: &str) -> Result<Arc<dyn Action>, ActionError> {
        self.constructors
            .get(method)
            .map(|construct| construct())
            .ok_or_else(|| ActionError::UnknownMethod(method.to_string()))
    }
}

/// First request argument as a string.
fn string_argument(payload: &[u8], what: &str) -> Result<String, ActionError> {
    crate::mbus::parse_arguments(payload)?
        .into_iter()
        .next()
        .and_then(|arg| match arg {
            Value::String(s) => Some(s),
            _ => None,
        })
        .ok_or_else(|| ActionError::InvalidArguments(format!("expected {what} as first argument")))
}
