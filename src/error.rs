//! Action-level error taxonomy.
//!
//! Every variant is surfaced to the caller as an exception response (or
//! stored on a failed task). None of them is fatal to the agent.

use thiserror::Error;

/// Failure produced while resolving or running an action.
///
/// The `Display` text is exactly what lands in the wire
/// `{"exception":{"message": ...}}` body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// No action is registered under the requested method name.
    #[error("unknown message {0}")]
    UnknownMethod(String),

    /// `get_task` was asked for an id the registry has never allocated.
    #[error("task with id {0} could not be found")]
    TaskNotFound(String),

    /// The request payload did not carry the arguments the action needs.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The action itself failed while running.
    #[error("{0}")]
    Execution(String),
}

impl ActionError {
    /// Shorthand for an execution failure with the given message.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}
