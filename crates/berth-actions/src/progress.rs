//! Progress reporting for pipeline execution
//!
//! A pipeline reports every stage transition, forward and backward, so
//! callers can stream deploy progress or assert on the exact order of
//! steps.

use serde::{Deserialize, Serialize};

/// Which direction a stage is moving in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Forward,
    Backward,
}

/// What happened to the stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Started,
    Completed,
    Failed,
}

/// Progress update for one stage of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    /// Action name
    pub action: String,

    /// 1-indexed stage number
    pub stage: usize,

    /// Total number of stages in the pipeline
    pub total_stages: usize,

    pub phase: Phase,

    pub state: StageState,

    /// Overall pipeline progress (0-100), based on completed forward stages
    pub percentage: u8,

    /// Human-readable status message
    pub message: String,
}

impl Progress {
    fn new(
        action: impl Into<String>,
        stage: usize,
        total_stages: usize,
        phase: Phase,
        state: StageState,
        message: impl Into<String>,
    ) -> Self {
        let done = match (phase, state) {
            (Phase::Forward, StageState::Completed) => stage,
            _ => stage.saturating_sub(1),
        };
        let percentage = if total_stages == 0 {
            0
        } else {
            ((done as f64 / total_stages as f64) * 100.0).min(100.0) as u8
        };

        Self {
            action: action.into(),
            stage,
            total_stages,
            phase,
            state,
            percentage,
            message: message.into(),
        }
    }

    /// Forward step is about to run
    pub fn starting(action: impl Into<String>, stage: usize, total_stages: usize) -> Self {
        Self::new(
            action,
            stage,
            total_stages,
            Phase::Forward,
            StageState::Started,
            "Starting...",
        )
    }

    /// Forward step returned successfully
    pub fn completed(action: impl Into<String>, stage: usize, total_stages: usize) -> Self {
        Self::new(
            action,
            stage,
            total_stages,
            Phase::Forward,
            StageState::Completed,
            "Completed",
        )
    }

    /// Forward step returned an error
    pub fn failed(
        action: impl Into<String>,
        stage: usize,
        total_stages: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            action,
            stage,
            total_stages,
            Phase::Forward,
            StageState::Failed,
            message,
        )
    }

    /// Backward step finished, successfully or not
    pub fn rolled_back(
        action: impl Into<String>,
        stage: usize,
        total_stages: usize,
        error: Option<String>,
    ) -> Self {
        let (state, message) = match error {
            None => (StageState::Completed, "Rolled back".to_string()),
            Some(e) => (StageState::Failed, format!("Rollback failed: {}", e)),
        };
        Self::new(action, stage, total_stages, Phase::Backward, state, message)
    }

    pub fn is_backward(&self) -> bool {
        self.phase == Phase::Backward
    }
}

/// Trait for types that can receive progress updates
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: Progress);
}

/// A no-op progress reporter
#[derive(Debug, Default, Clone)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _progress: Progress) {}
}

/// A progress reporter that collects all updates
#[derive(Debug, Default)]
pub struct CollectingReporter {
    updates: std::sync::Mutex<Vec<Progress>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<Progress> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Progress> {
        self.updates.lock().ok().and_then(|u| u.last().cloned())
    }
}

impl ProgressReporter for CollectingReporter {
    fn report(&self, progress: Progress) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(progress);
        }
    }
}
