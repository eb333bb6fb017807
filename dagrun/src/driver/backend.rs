//! The compute-backend seam.
//!
//! The driver does not care whether work runs in a container runtime, a job
//! scheduler, or a mock; it only needs to submit a unit of work and await
//! its completion. Backends implement [`WorkUnitRunner`] and are selected
//! through [`RunnerConfig`] at construction time.

use crate::errors::WorkUnitFailure;
use crate::pipeline::Step;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

/// Handle to a submitted unit of work.
#[derive(Debug, Clone)]
pub struct WorkUnitHandle {
    /// Backend-assigned identifier.
    pub id: String,
    /// UUID of the step the work belongs to.
    pub step: Uuid,
    /// When the work was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl WorkUnitHandle {
    /// Creates a handle stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, step: Uuid) -> Self {
        Self {
            id: id.into(),
            step,
            submitted_at: Utc::now(),
        }
    }
}

/// Whether a run waits for each unit of work to reach a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Suspend until the work unit completes (the default).
    #[default]
    WaitForCompletion,
    /// Return as soon as the work unit is submitted.
    FireAndForget,
}

/// Capability interface for a compute backend.
#[async_trait]
pub trait WorkUnitRunner: Send + Sync + Debug {
    /// Submits the step's unit of work and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkUnitFailure`] if the work cannot be submitted.
    async fn submit(&self, step: &Step) -> Result<WorkUnitHandle, WorkUnitFailure>;

    /// Waits for a previously submitted unit of work to reach a terminal
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`WorkUnitFailure`] if the work terminated unsuccessfully.
    async fn wait(&self, handle: WorkUnitHandle) -> Result<(), WorkUnitFailure>;
}

/// Backend selection, decided once when the driver is constructed.
#[derive(Debug, Clone)]
pub enum RunnerConfig {
    /// Submissions succeed immediately without doing anything.
    NoOp,
    /// Each step's file reference is executed as a local process.
    LocalProcess {
        /// Interpreter the step file is passed to (e.g. `python3`).
        interpreter: String,
    },
}

/// Builds the runner a configuration names.
#[must_use]
pub fn runner_for(config: &RunnerConfig) -> Arc<dyn WorkUnitRunner> {
    match config {
        RunnerConfig::NoOp => Arc::new(NoOpRunner),
        RunnerConfig::LocalProcess { interpreter } => {
            Arc::new(super::process::LocalProcessRunner::new(interpreter.clone()))
        }
    }
}

/// A backend that accepts every submission and completes instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRunner;

#[async_trait]
impl WorkUnitRunner for NoOpRunner {
    async fn submit(&self, step: &Step) -> Result<WorkUnitHandle, WorkUnitFailure> {
        Ok(WorkUnitHandle::new(Uuid::new_v4().to_string(), step.uuid()))
    }

    async fn wait(&self, _handle: WorkUnitHandle) -> Result<(), WorkUnitFailure> {
        Ok(())
    }
}
