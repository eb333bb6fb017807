//! Mock compute backends for testing.

use crate::driver::{WorkUnitHandle, WorkUnitRunner};
use crate::errors::WorkUnitFailure;
use crate::pipeline::Step;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// A backend that records every submission and tracks how many units of
/// work are in flight at once.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    delay: Duration,
    submissions: Mutex<Vec<Uuid>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RecordingRunner {
    /// Creates a runner whose work completes immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner whose `wait` holds each unit of work open for the
    /// given duration, so overlap between branches becomes observable.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Every submitted step, in submission order.
    #[must_use]
    pub fn submissions(&self) -> Vec<Uuid> {
        self.submissions.lock().clone()
    }

    /// How many times the given step was submitted.
    #[must_use]
    pub fn submission_count(&self, step: Uuid) -> usize {
        self.submissions
            .lock()
            .iter()
            .filter(|seen| **seen == step)
            .count()
    }

    /// The largest number of units of work in flight at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkUnitRunner for RecordingRunner {
    async fn submit(&self, step: &Step) -> Result<WorkUnitHandle, WorkUnitFailure> {
        self.submissions.lock().push(step.uuid());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        Ok(WorkUnitHandle::new(Uuid::new_v4().to_string(), step.uuid()))
    }

    async fn wait(&self, _handle: WorkUnitHandle) -> Result<(), WorkUnitFailure> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Which backend call fails for the configured step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePoint {
    Submit,
    Wait,
}

/// A backend that fails a single step and records every submission.
#[derive(Debug)]
pub struct FailingRunner {
    fail_step: Uuid,
    point: FailurePoint,
    submissions: Mutex<Vec<Uuid>>,
}

impl FailingRunner {
    /// Fails the given step at submission time.
    #[must_use]
    pub fn fail_on_submit(fail_step: Uuid) -> Self {
        Self {
            fail_step,
            point: FailurePoint::Submit,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Accepts the given step's submission but fails its wait.
    #[must_use]
    pub fn fail_on_wait(fail_step: Uuid) -> Self {
        Self {
            fail_step,
            point: FailurePoint::Wait,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Every submitted step, in submission order.
    #[must_use]
    pub fn submissions(&self) -> Vec<Uuid> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl WorkUnitRunner for FailingRunner {
    async fn submit(&self, step: &Step) -> Result<WorkUnitHandle, WorkUnitFailure> {
        self.submissions.lock().push(step.uuid());
        if self.point == FailurePoint::Submit && step.uuid() == self.fail_step {
            return Err(WorkUnitFailure::new(
                step.uuid(),
                step.name(),
                "submission rejected",
            ));
        }
        Ok(WorkUnitHandle::new(Uuid::new_v4().to_string(), step.uuid()))
    }

    async fn wait(&self, handle: WorkUnitHandle) -> Result<(), WorkUnitFailure> {
        if self.point == FailurePoint::Wait && handle.step == self.fail_step {
            return Err(WorkUnitFailure::new(handle.step, "", "work unit failed"));
        }
        Ok(())
    }
}
