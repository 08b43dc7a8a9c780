//! Error types for the pipeline engine
//!
//! This module provides error types for single action failures and for
//! whole-pipeline failures, including failures raised while rolling back.

use thiserror::Error;

/// Error type for a single action
#[derive(Debug, Error)]
pub enum ActionError {
    /// Action execution failed
    #[error("action execution failed: {0}")]
    ExecutionFailed(String),

    /// An external command exited unsuccessfully
    #[error("command exited with code {code}: {message}")]
    CommandFailed { code: i32, message: String },

    /// Invalid action parameters
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Action precondition not met
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Remote collaborator failed (status store, transport)
    #[error("remote error: {0}")]
    Remote(String),

    /// I/O error during action execution
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for action operations
pub type Result<T> = std::result::Result<T, ActionError>;

/// An undo step that failed while a pipeline was unwinding
#[derive(Debug)]
pub struct RollbackFailure {
    /// Name of the action whose backward step failed
    pub action: String,
    /// The error it returned
    pub error: ActionError,
}

/// Error type for pipeline execution
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline was built without any actions
    #[error("no actions to execute")]
    NoActions,

    /// A stage failed; completed stages were unwound before returning
    #[error("action '{action}' failed: {source}{}", rollback_summary(.rollback_failures))]
    StageFailed {
        action: String,
        #[source]
        source: ActionError,
        rollback_failures: Vec<RollbackFailure>,
    },
}

impl PipelineError {
    /// Name of the stage that triggered the failure
    pub fn failed_action(&self) -> Option<&str> {
        match self {
            PipelineError::StageFailed { action, .. } => Some(action),
            PipelineError::NoActions => None,
        }
    }

    /// The error returned by the failing stage
    pub fn action_error(&self) -> Option<&ActionError> {
        match self {
            PipelineError::StageFailed { source, .. } => Some(source),
            PipelineError::NoActions => None,
        }
    }

    /// Undo steps that failed while unwinding
    pub fn rollback_failures(&self) -> &[RollbackFailure] {
        match self {
            PipelineError::StageFailed {
                rollback_failures, ..
            } => rollback_failures,
            PipelineError::NoActions => &[],
        }
    }
}

fn rollback_summary(failures: &[RollbackFailure]) -> String {
    if failures.is_empty() {
        return String::new();
    }
    let details: Vec<String> = failures
        .iter()
        .map(|f| format!("'{}': {}", f.action, f.error))
        .collect();
    format!(" (rollback also failed for {})", details.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ActionError::ExecutionFailed("disk full".to_string());
        assert_eq!(err.to_string(), "action execution failed: disk full");

        let err = ActionError::CommandFailed {
            code: 1,
            message: "recipe not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "command exited with code 1: recipe not found"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let action_err: ActionError = io_err.into();
        assert!(matches!(action_err, ActionError::Io(_)));
    }

    #[test]
    fn test_stage_failed_without_rollback_failures() {
        let err = PipelineError::StageFailed {
            action: "deploy".to_string(),
            source: ActionError::ExecutionFailed("boom".to_string()),
            rollback_failures: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "action 'deploy' failed: action execution failed: boom"
        );
        assert_eq!(err.failed_action(), Some("deploy"));
        assert!(err.rollback_failures().is_empty());
    }

    #[test]
    fn test_stage_failed_reports_rollback_failures() {
        let err = PipelineError::StageFailed {
            action: "deploy".to_string(),
            source: ActionError::ExecutionFailed("boom".to_string()),
            rollback_failures: vec![RollbackFailure {
                action: "prepare_json".to_string(),
                error: ActionError::ExecutionFailed("busy".to_string()),
            }],
        };
        let message = err.to_string();
        assert!(message.starts_with("action 'deploy' failed: action execution failed: boom"));
        assert!(message.contains("rollback also failed for 'prepare_json'"));
        assert_eq!(err.rollback_failures().len(), 1);
    }

    #[test]
    fn test_no_actions() {
        let err = PipelineError::NoActions;
        assert_eq!(err.to_string(), "no actions to execute");
        assert!(err.failed_action().is_none());
        assert!(err.action_error().is_none());
    }
}
