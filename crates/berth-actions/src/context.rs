//! Action execution contexts and result types
//!
//! A pipeline hands each action a context borrowing the shared argument
//! value. Forward steps also see the result of the step before them;
//! backward steps see the result their own forward step produced.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Context passed to an action's forward step
pub struct ForwardContext<'a, A> {
    args: &'a A,
    previous: Option<&'a ActionResult>,
    index: usize,
}

impl<'a, A> ForwardContext<'a, A> {
    pub fn new(args: &'a A, previous: Option<&'a ActionResult>, index: usize) -> Self {
        Self {
            args,
            previous,
            index,
        }
    }

    /// The shared pipeline arguments
    pub fn args(&self) -> &'a A {
        self.args
    }

    /// Result of the previous forward step, None for the first stage
    pub fn previous(&self) -> Option<&'a ActionResult> {
        self.previous
    }

    /// Zero-based position of this action in the pipeline
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<A> Clone for ForwardContext<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for ForwardContext<'_, A> {}

/// Context passed to an action's backward step
pub struct BackwardContext<'a, A> {
    args: &'a A,
    forward_result: &'a ActionResult,
}

impl<'a, A> BackwardContext<'a, A> {
    pub fn new(args: &'a A, forward_result: &'a ActionResult) -> Self {
        Self {
            args,
            forward_result,
        }
    }

    pub fn args(&self) -> &'a A {
        self.args
    }

    /// What this action's forward step returned
    pub fn forward_result(&self) -> &'a ActionResult {
        self.forward_result
    }
}

/// Result returned from a forward step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    /// Human-readable message describing the outcome
    pub message: String,

    /// Output data handed to the next stage and to this stage's undo
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output: HashMap<String, serde_json::Value>,

    /// Duration of the forward step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,

    /// Exit code (for actions that wrap external commands)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ActionResult {
    /// Create a result with a message
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: HashMap::new(),
            duration: None,
            exit_code: None,
        }
    }

    /// Add output data
    pub fn with_output(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.output.insert(key.into(), json_value);
        }
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Get output value by key
    pub fn get_output(&self, key: &str) -> Option<&serde_json::Value> {
        self.output.get(key)
    }

    /// Get output value as a specific type
    pub fn get_output_as<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.output
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl Default for ActionResult {
    fn default() -> Self {
        Self::success("OK")
    }
}

impl<A> std::fmt::Debug for ForwardContext<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardContext")
            .field("index", &self.index)
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}
