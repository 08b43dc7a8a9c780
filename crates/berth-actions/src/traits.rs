//! Action trait definition
//!
//! An action is one named, reversible step of a pipeline. The forward step
//! does the work; the optional backward step undoes it when a later stage
//! fails.

use crate::context::{ActionResult, BackwardContext, ForwardContext};
use crate::error::{ActionError, Result};
use async_trait::async_trait;

/// Core trait for pipeline actions
///
/// `A` is the argument value shared by every stage of one pipeline run.
///
/// # Example
///
/// ```ignore
/// use berth_actions::{Action, ActionResult, ForwardContext, Result};
/// use async_trait::async_trait;
///
/// struct Greet;
///
/// #[async_trait]
/// impl Action<String> for Greet {
///     fn name(&self) -> &str {
///         "greet"
///     }
///
///     async fn forward(&self, ctx: ForwardContext<'_, String>) -> Result<ActionResult> {
///         Ok(ActionResult::success(format!("hello {}", ctx.args())))
///     }
/// }
/// ```
#[async_trait]
pub trait Action<A>: Send + Sync
where
    A: Send + Sync + 'static,
{
    /// Get the action name (used in logs and errors)
    fn name(&self) -> &str;

    /// Perform the step
    async fn forward(&self, ctx: ForwardContext<'_, A>) -> Result<ActionResult>;

    /// Undo the step after a later stage failed
    ///
    /// Only called when `reversible()` returns true.
    async fn backward(&self, _ctx: BackwardContext<'_, A>) -> Result<()> {
        Ok(())
    }

    /// Whether this action defines a backward step
    fn reversible(&self) -> bool {
        false
    }

    /// Hook invoked with the forward error before the pipeline unwinds
    fn on_error(&self, _ctx: &ForwardContext<'_, A>, _error: &ActionError) {}
}

/// A simple no-op action for testing
pub struct NoopAction {
    name: String,
}

impl NoopAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl<A> Action<A> for NoopAction
where
    A: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, _ctx: ForwardContext<'_, A>) -> Result<ActionResult> {
        Ok(ActionResult::success("No-op completed"))
    }
}

/// An action that always fails (for testing error handling)
pub struct FailingAction {
    name: String,
    error_message: String,
}

impl FailingAction {
    pub fn new(name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error_message: error_message.into(),
        }
    }
}

#[async_trait]
impl<A> Action<A> for FailingAction
where
    A: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, _ctx: ForwardContext<'_, A>) -> Result<ActionResult> {
        Err(ActionError::ExecutionFailed(self.error_message.clone()))
    }
}
