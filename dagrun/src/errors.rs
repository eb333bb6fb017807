//! Error types for the dagrun core.
//!
//! Structural errors (a malformed pipeline description) are fatal and never
//! retried here; work-unit failures are surfaced to the caller unchanged;
//! store errors are transient by design and usually logged rather than
//! propagated past the eviction loop.

use thiserror::Error;
use uuid::Uuid;

/// The main error type for dagrun operations.
#[derive(Debug, Error)]
pub enum DagrunError {
    /// The pipeline description is structurally invalid.
    #[error("{0}")]
    Malformed(#[from] MalformedPipelineError),

    /// A step's unit of work terminated in a failure state.
    #[error("{0}")]
    WorkUnit(#[from] WorkUnitFailure),

    /// An object-store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when a pipeline description cannot be turned into a valid DAG.
///
/// Construction either fully succeeds or fails with this error; a pipeline is
/// never left half-built.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct MalformedPipelineError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error, if known.
    pub steps: Vec<Uuid>,
}

impl MalformedPipelineError {
    /// Creates a new malformed-pipeline error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
        }
    }

    /// Creates an error for an `incoming_connections` entry that references
    /// a step absent from the step map.
    #[must_use]
    pub fn dangling_parent(step: Uuid, missing: Uuid) -> Self {
        Self {
            message: format!(
                "step {step} references parent {missing} which is not part of the pipeline"
            ),
            steps: vec![step, missing],
        }
    }

    /// Creates an error for a dependency cycle, with the offending path.
    #[must_use]
    pub fn cycle(path: Vec<Uuid>) -> Self {
        let rendered = path
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        Self {
            message: format!("pipeline contains a dependency cycle: {rendered}"),
            steps: path,
        }
    }
}

/// Error raised when a step's submitted unit of work fails.
///
/// Cloneable so a single failure can resolve every branch waiting on the same
/// fan-in join point.
#[derive(Debug, Clone, Error)]
#[error("work unit for step '{step_name}' ({step}) failed: {reason}")]
pub struct WorkUnitFailure {
    /// UUID of the failed step.
    pub step: Uuid,
    /// Display name of the failed step.
    pub step_name: String,
    /// Backend-provided failure reason.
    pub reason: String,
}

impl WorkUnitFailure {
    /// Creates a new work-unit failure.
    #[must_use]
    pub fn new(step: Uuid, step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step,
            step_name: step_name.into(),
            reason: reason.into(),
        }
    }

    /// Failure for a parent reference that resolved to no step at run time.
    ///
    /// Unreachable for pipelines built through [`crate::pipeline::Pipeline::build`],
    /// which validates every edge.
    #[must_use]
    pub fn unknown_step(step: Uuid) -> Self {
        Self {
            step,
            step_name: "unknown".to_string(),
            reason: "step is not present in the pipeline".to_string(),
        }
    }
}

/// Errors surfaced by the shared object store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Transient failure reading the notification channel.
    #[error("failed to read store notification: {0}")]
    Notification(String),

    /// The notification channel closed; the owning session is gone.
    #[error("store notification channel closed")]
    ChannelClosed,

    /// Metadata lookup failed.
    #[error("failed to fetch metadata for object {object}: {reason}")]
    Metadata {
        /// The object whose metadata was requested.
        object: String,
        /// The underlying reason.
        reason: String,
    },

    /// Delete-by-ID failed (deleting an absent ID is not an error).
    #[error("failed to delete object {object}: {reason}")]
    Delete {
        /// The object targeted for deletion.
        object: String,
        /// The underlying reason.
        reason: String,
    },
}
