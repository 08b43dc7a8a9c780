//! Pipeline execution
//!
//! A `Pipeline` runs an ordered list of actions against one shared argument
//! value. Stages run strictly in order. When stage k fails, every earlier
//! stage that defines a backward step is undone in reverse order before the
//! error is returned, and no stage after k runs.

use crate::context::{ActionResult, BackwardContext, ForwardContext};
use crate::error::{PipelineError, RollbackFailure};
use crate::progress::{NoopReporter, Progress, ProgressReporter};
use crate::traits::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// An ordered, rollback-capable sequence of actions
///
/// # Example
///
/// ```ignore
/// use berth_actions::{Pipeline, NoopAction};
/// use std::sync::Arc;
///
/// let pipeline = Pipeline::new(vec![
///     Arc::new(NoopAction::new("first")),
///     Arc::new(NoopAction::new("second")),
/// ]);
/// let last = pipeline.execute(&args).await?;
/// ```
pub struct Pipeline<A>
where
    A: Send + Sync + 'static,
{
    actions: Vec<Arc<dyn Action<A>>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<A> Pipeline<A>
where
    A: Send + Sync + 'static,
{
    pub fn new(actions: Vec<Arc<dyn Action<A>>>) -> Self {
        Self {
            actions,
            reporter: Arc::new(NoopReporter),
        }
    }

    /// Set the progress reporter
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Append an action
    pub fn with_action(mut self, action: Arc<dyn Action<A>>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Names of the stages in execution order
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Run every stage in order
    ///
    /// Returns the result of the last stage. On failure the pipeline has
    /// already been unwound; the error names the failing stage and carries
    /// any undo failures.
    pub async fn execute(&self, args: &A) -> Result<ActionResult, PipelineError> {
        if self.actions.is_empty() {
            return Err(PipelineError::NoActions);
        }

        let total = self.actions.len();
        let mut completed: Vec<(usize, ActionResult)> = Vec::with_capacity(total);

        for (index, action) in self.actions.iter().enumerate() {
            let stage = index + 1;
            let name = action.name().to_string();

            self.reporter.report(Progress::starting(&name, stage, total));
            debug!(action = %name, stage, total, "Running forward step");

            let ctx = ForwardContext::new(args, completed.last().map(|(_, r)| r), index);
            let start = Instant::now();
            let outcome = action.forward(ctx).await;

            match outcome {
                Ok(result) => {
                    self.reporter.report(Progress::completed(&name, stage, total));
                    completed.push((index, result.with_duration(start.elapsed())));
                }
                Err(err) => {
                    let ctx = ForwardContext::new(args, completed.last().map(|(_, r)| r), index);
                    action.on_error(&ctx, &err);

                    warn!(action = %name, error = %err, "Forward step failed, rolling back");
                    self.reporter
                        .report(Progress::failed(&name, stage, total, err.to_string()));

                    let rollback_failures = self.rollback(args, &completed).await;
                    return Err(PipelineError::StageFailed {
                        action: name,
                        source: err,
                        rollback_failures,
                    });
                }
            }
        }

        Ok(completed.pop().map(|(_, r)| r).unwrap_or_default())
    }

    /// Undo completed stages in reverse order, collecting undo failures
    async fn rollback(&self, args: &A, completed: &[(usize, ActionResult)]) -> Vec<RollbackFailure> {
        let total = self.actions.len();
        let mut failures = Vec::new();

        for (index, forward_result) in completed.iter().rev() {
            let action = &self.actions[*index];
            if !action.reversible() {
                continue;
            }

            let name = action.name().to_string();
            debug!(action = %name, "Running backward step");

            match action
                .backward(BackwardContext::new(args, forward_result))
                .await
            {
                Ok(()) => {
                    self.reporter
                        .report(Progress::rolled_back(&name, index + 1, total, None));
                }
                Err(err) => {
                    error!(action = %name, error = %err, "Backward step failed");
                    self.reporter.report(Progress::rolled_back(
                        &name,
                        index + 1,
                        total,
                        Some(err.to_string()),
                    ));
                    failures.push(RollbackFailure {
                        action: name,
                        error: err,
                    });
                }
            }
        }

        failures
    }
}

impl<A> std::fmt::Debug for Pipeline<A>
where
    A: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("actions", &self.action_names())
            .finish_non_exhaustive()
    }
}
