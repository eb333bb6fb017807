//! Local-process compute backend.
//!
//! Executes a step's file reference through a configured interpreter via
//! `tokio::process`. This is the minimal real backend; cluster-scale
//! backends live behind the same [`WorkUnitRunner`] seam elsewhere.

use crate::driver::{WorkUnitHandle, WorkUnitRunner};
use crate::errors::WorkUnitFailure;
use crate::pipeline::Step;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::process::{Child, Command};
use tracing::debug;
use uuid::Uuid;

/// Runs each step as `<interpreter> <file_path>` on the local machine.
#[derive(Debug)]
pub struct LocalProcessRunner {
    interpreter: String,
    children: DashMap<String, Child>,
}

impl LocalProcessRunner {
    /// Creates a runner that hands step files to the given interpreter.
    #[must_use]
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            children: DashMap::new(),
        }
    }
}

#[async_trait]
impl WorkUnitRunner for LocalProcessRunner {
    async fn submit(&self, step: &Step) -> Result<WorkUnitHandle, WorkUnitFailure> {
        let Some(file_path) = step.file_path() else {
            return Err(WorkUnitFailure::new(
                step.uuid(),
                step.name(),
                "step has no file reference to execute",
            ));
        };

        let child = Command::new(&self.interpreter)
            .arg(file_path)
            .spawn()
            .map_err(|err| {
                WorkUnitFailure::new(
                    step.uuid(),
                    step.name(),
                    format!("failed to spawn '{} {file_path}': {err}", self.interpreter),
                )
            })?;

        debug!(step = %step.uuid(), file_path, "spawned local process");

        let handle = WorkUnitHandle::new(Uuid::new_v4().to_string(), step.uuid());
        self.children.insert(handle.id.clone(), child);
        Ok(handle)
    }

    async fn wait(&self, handle: WorkUnitHandle) -> Result<(), WorkUnitFailure> {
        let Some((_, mut child)) = self.children.remove(&handle.id) else {
            // Already waited on, or fire-and-forget submitted elsewhere.
            return Ok(());
        };

        let status = child.wait().await.map_err(|err| {
            WorkUnitFailure::new(handle.step, "", format!("failed to await process: {err}"))
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(WorkUnitFailure::new(
                handle.step,
                "",
                format!("process exited with {status}"),
            ))
        }
    }
}
