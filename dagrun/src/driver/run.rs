//! Concurrent pipeline execution.
//!
//! A run starts at the pipeline's sentinel and recursively runs every step's
//! proper ancestors to completion before the step itself, fanning out across
//! independent branches. Each step's body is memoized as a shared future for
//! the duration of the run, so sibling branches converging on a common
//! ancestor await the same single execution rather than racing to start a
//! second one.

use crate::driver::{RunnerConfig, WaitPolicy, WorkUnitRunner, runner_for};
use crate::errors::{DagrunError, WorkUnitFailure};
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::{Pipeline, Step, StepKind};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, try_join_all};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// The memoized, shareable result of one step's execution within a run.
type StepFuture = Shared<BoxFuture<'static, Result<(), WorkUnitFailure>>>;

/// Runs a pipeline to completion, concurrently, respecting dependency order.
pub struct PipelineDriver {
    backend: Arc<dyn WorkUnitRunner>,
    wait_policy: WaitPolicy,
    events: Arc<dyn EventSink>,
}

impl PipelineDriver {
    /// Creates a driver over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn WorkUnitRunner>) -> Self {
        Self {
            backend,
            wait_policy: WaitPolicy::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a driver from a backend configuration.
    #[must_use]
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(runner_for(config))
    }

    /// Sets the wait policy for the whole run.
    #[must_use]
    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait_policy = policy;
        self
    }

    /// Sets the event sink run and step lifecycle events are reported to.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Runs the whole pipeline by running its sentinel.
    ///
    /// Every step executes at most once; a failing unit of work aborts the
    /// run and resolves the sibling waits at its fan-in points. Started
    /// flags are reset afterwards so the same pipeline object can be run
    /// again.
    ///
    /// # Errors
    ///
    /// Returns [`DagrunError::WorkUnit`] carrying the first failure.
    pub async fn run(&self, pipeline: Arc<Pipeline>) -> Result<(), DagrunError> {
        let sentinel = pipeline.sentinel();
        let state = Arc::new(RunState {
            pipeline: Arc::clone(&pipeline),
            backend: Arc::clone(&self.backend),
            wait_policy: self.wait_policy,
            events: Arc::clone(&self.events),
            tasks: DashMap::new(),
        });

        self.events.try_emit(
            "run.started",
            Some(serde_json::json!({ "steps": pipeline.len() })),
        );
        info!(steps = pipeline.len(), "pipeline run started");

        let result = Arc::clone(&state).run_ancestors_then_self(sentinel).await;
        // The memoized futures hold the run state alive through the map;
        // dropping them here breaks that cycle once the run is over.
        state.tasks.clear();
        pipeline.reset_started();

        match result {
            Ok(()) => {
                self.events.try_emit("run.completed", None);
                info!("pipeline run completed");
                Ok(())
            }
            Err(failure) => {
                self.events.try_emit(
                    "run.failed",
                    Some(serde_json::json!({
                        "step": failure.step.to_string(),
                        "reason": failure.reason,
                    })),
                );
                Err(DagrunError::WorkUnit(failure))
            }
        }
    }
}

impl fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("backend", &self.backend)
            .field("wait_policy", &self.wait_policy)
            .finish_non_exhaustive()
    }
}

/// Shared state of a single run.
struct RunState {
    pipeline: Arc<Pipeline>,
    backend: Arc<dyn WorkUnitRunner>,
    wait_policy: WaitPolicy,
    events: Arc<dyn EventSink>,
    /// Per-step memoized futures; the entry winner's future is the one
    /// execution every branch awaits.
    tasks: DashMap<Uuid, StepFuture>,
}

impl RunState {
    /// Returns the memoized future for a step, creating it on first demand.
    fn step_future(self: &Arc<Self>, uuid: Uuid) -> StepFuture {
        if let Some(existing) = self.tasks.get(&uuid) {
            return existing.clone();
        }

        let future: StepFuture = match self.pipeline.step(&uuid) {
            Some(step) => {
                let state = Arc::clone(self);
                let step = Arc::clone(step);
                async move { state.run_ancestors_then_self(step).await }
                    .boxed()
                    .shared()
            }
            None => {
                let failure = WorkUnitFailure::unknown_step(uuid);
                async move { Err(failure) }.boxed().shared()
            }
        };

        match self.tasks.entry(uuid) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                entry.insert(future.clone());
                future
            }
        }
    }

    /// Runs all of a step's proper ancestors to completion, then the step
    /// itself, at most once per run.
    async fn run_ancestors_then_self(
        self: Arc<Self>,
        step: Arc<Step>,
    ) -> Result<(), WorkUnitFailure> {
        if step.has_started() {
            return Ok(());
        }

        // Fan out over every parent, fan in before our own work begins. A
        // failing parent subtree resolves this join point with its error and
        // the remaining siblings are abandoned.
        let parents: Vec<StepFuture> = step
            .parents()
            .iter()
            .map(|parent| self.step_future(*parent))
            .collect();
        try_join_all(parents).await?;

        if !step.mark_started() {
            return Ok(());
        }

        if step.kind() != StepKind::Task {
            return Ok(());
        }

        self.events.try_emit(
            "step.started",
            Some(serde_json::json!({
                "step": step.uuid().to_string(),
                "name": step.name(),
            })),
        );
        debug!(step = %step.uuid(), name = step.name(), "step started");

        let outcome = self.execute(&step).await;

        match &outcome {
            Ok(()) => self.events.try_emit(
                "step.completed",
                Some(serde_json::json!({ "step": step.uuid().to_string() })),
            ),
            Err(failure) => self.events.try_emit(
                "step.failed",
                Some(serde_json::json!({
                    "step": step.uuid().to_string(),
                    "reason": failure.reason,
                })),
            ),
        }

        outcome
    }

    async fn execute(&self, step: &Step) -> Result<(), WorkUnitFailure> {
        let handle = self.backend.submit(step).await?;
        match self.wait_policy {
            WaitPolicy::WaitForCompletion => self.backend.wait(handle).await,
            WaitPolicy::FireAndForget => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::testing::fixtures::{chain, diamond};
    use crate::testing::mocks::{FailingRunner, RecordingRunner};
    use std::time::Duration;

    fn driver_over(runner: Arc<RecordingRunner>) -> PipelineDriver {
        PipelineDriver::new(runner)
    }

    #[tokio::test]
    async fn test_chain_runs_in_dependency_order() {
        let (desc, uuids) = chain(3);
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(RecordingRunner::new());

        driver_over(Arc::clone(&runner))
            .run(Arc::clone(&pipeline))
            .await
            .unwrap();

        assert_eq!(runner.submissions(), uuids);
    }

    #[tokio::test]
    async fn test_diamond_runs_shared_ancestor_once() {
        let (desc, [a, b, c, d]) = diamond();
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(RecordingRunner::new());

        driver_over(Arc::clone(&runner))
            .run(Arc::clone(&pipeline))
            .await
            .unwrap();

        let submissions = runner.submissions();
        assert_eq!(submissions.len(), 4);
        assert_eq!(runner.submission_count(a), 1);
        assert_eq!(submissions[0], a);
        assert_eq!(submissions[3], d);
        assert!(submissions[1..3].contains(&b));
        assert!(submissions[1..3].contains(&c));
    }

    #[tokio::test]
    async fn test_sibling_branches_overlap() {
        let (desc, _) = diamond();
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(RecordingRunner::with_delay(Duration::from_millis(25)));

        driver_over(Arc::clone(&runner))
            .run(Arc::clone(&pipeline))
            .await
            .unwrap();

        assert!(runner.peak_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_rerun_resubmits_every_step() {
        let (desc, _) = diamond();
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(RecordingRunner::new());
        let driver = driver_over(Arc::clone(&runner));

        driver.run(Arc::clone(&pipeline)).await.unwrap();
        driver.run(Arc::clone(&pipeline)).await.unwrap();

        assert_eq!(runner.submissions().len(), 8);
        for step in pipeline.steps() {
            assert!(!step.has_started());
        }
    }

    #[tokio::test]
    async fn test_failing_parent_aborts_descendants() {
        let (desc, [_a, b, _c, d]) = diamond();
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(FailingRunner::fail_on_submit(b));

        let err = PipelineDriver::new(Arc::clone(&runner) as Arc<dyn WorkUnitRunner>)
            .run(Arc::clone(&pipeline))
            .await
            .unwrap_err();

        match err {
            DagrunError::WorkUnit(failure) => assert_eq!(failure.step, b),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!runner.submissions().contains(&d));
    }

    #[tokio::test]
    async fn test_fire_and_forget_skips_wait() {
        let (desc, [a, ..]) = diamond();
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(FailingRunner::fail_on_wait(a));

        PipelineDriver::new(Arc::clone(&runner) as Arc<dyn WorkUnitRunner>)
            .with_wait_policy(WaitPolicy::FireAndForget)
            .run(Arc::clone(&pipeline))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_failure_fails_the_run() {
        let (desc, [a, ..]) = diamond();
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(FailingRunner::fail_on_wait(a));

        let result = PipelineDriver::new(Arc::clone(&runner) as Arc<dyn WorkUnitRunner>)
            .run(Arc::clone(&pipeline))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_emitted() {
        let (desc, uuids) = chain(3);
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(RecordingRunner::new());
        let sink = Arc::new(CollectingEventSink::new());

        driver_over(Arc::clone(&runner))
            .with_events(Arc::clone(&sink) as Arc<dyn EventSink>)
            .run(Arc::clone(&pipeline))
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.first().map(|(t, _)| t.as_str()), Some("run.started"));
        assert_eq!(
            events.last().map(|(t, _)| t.as_str()),
            Some("run.completed")
        );
        assert_eq!(sink.events_of_type("step.started").len(), uuids.len());
        assert_eq!(sink.events_of_type("step.completed").len(), uuids.len());
    }

    #[tokio::test]
    async fn test_empty_pipeline_run_is_trivially_complete() {
        let desc = crate::description::PipelineDescription::new("empty");
        let pipeline = Arc::new(Pipeline::build(&desc).unwrap());
        let runner = Arc::new(RecordingRunner::new());

        driver_over(Arc::clone(&runner))
            .run(pipeline)
            .await
            .unwrap();

        assert!(runner.submissions().is_empty());
    }
}
