//! Sequential step runner with compensating cleanup.
//!
//! Steps run strictly in order. The first halt stops the pipeline, the
//! halting error is recorded in [`BuildState::error`], and `cleanup` runs on
//! every step whose `run` completed, last first. Cleanup is best effort: a
//! failing cleanup is logged, recorded as a warning, and the unwind goes on.
//! Nothing is retried here; retrying belongs inside a step.

use std::future::Future;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::BuildError;
use super::poller::Poller;
use super::state::BuildState;
use crate::adapters::ClientResult;
use crate::domain::{Event, EventType};

/// Verdict of a step's `run`
#[derive(Debug)]
pub enum StepAction {
    Continue,
    Halt(BuildError),
}

impl From<Result<(), BuildError>> for StepAction {
    fn from(result: Result<(), BuildError>) -> Self {
        match result {
            Ok(()) => Self::Continue,
            Err(e) => Self::Halt(e),
        }
    }
}

/// Run-scoped handles passed to every step
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: Uuid,
    pub poller: Poller,
}

impl StepContext {
    pub fn new(run_id: Uuid, poller: Poller) -> Self {
        Self { run_id, poller }
    }

    pub fn is_cancelled(&self) -> bool {
        self.poller.cancel_token().is_cancelled()
    }

    /// Context for compensating actions, immune to the run's cancellation
    pub fn detached(&self) -> Self {
        Self::new(self.run_id, self.poller.detached())
    }

    /// See [`Poller::guard`]
    pub async fn guard<F: Future>(&self, what: &str, fut: F) -> Result<F::Output, BuildError> {
        self.poller.guard(what, fut).await
    }

    /// See [`Poller::call`]
    pub async fn call<T, F>(&self, operation: &str, fut: F) -> Result<T, BuildError>
    where
        F: Future<Output = ClientResult<T>>,
    {
        self.poller.call(operation, fut).await
    }
}

/// One stage of the build
#[async_trait]
pub trait Step: Send + Sync {
    /// Name used in logs and the journal
    fn name(&self) -> &str;

    async fn run(&self, state: &mut BuildState, ctx: &StepContext) -> StepAction;

    /// Undo whatever `run` created. Must tolerate being called again.
    async fn cleanup(&self, _state: &mut BuildState, _ctx: &StepContext) -> Result<(), BuildError> {
        Ok(())
    }
}

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Halted,
}

/// Outcome plus the step journal
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub events: Vec<Event>,
}

impl RunReport {
    /// Steps whose cleanup ran, in the order it ran
    pub fn cleaned_up(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| matches!(e.event_type, EventType::CleanedUp | EventType::CleanupFailed))
            .map(|e| e.step.as_str())
            .collect()
    }
}

/// Ordered list of steps
#[derive(Default)]
pub struct PipelineRunner {
    steps: Vec<Box<dyn Step>>,
}

impl PipelineRunner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step, unwinding on the first halt
    pub async fn run(&self, state: &mut BuildState, ctx: &StepContext) -> RunReport {
        let mut events = Vec::new();
        let mut completed = 0usize;
        let mut outcome = RunOutcome::Completed;

        for step in &self.steps {
            if ctx.is_cancelled() {
                let err = BuildError::cancelled(format!("step '{}' to start", step.name()));
                warn!(step = step.name(), "Build cancelled");
                events.push(
                    Event::new(ctx.run_id, step.name(), EventType::StepHalted)
                        .with_error(err.to_string()),
                );
                state.error = Some(err);
                outcome = RunOutcome::Halted;
                break;
            }

            info!(step = step.name(), "Running step");
            events.push(Event::new(ctx.run_id, step.name(), EventType::StepStarted));

            match step.run(state, ctx).await {
                StepAction::Continue => {
                    events.push(Event::new(ctx.run_id, step.name(), EventType::StepCompleted));
                    completed += 1;
                }
                StepAction::Halt(err) => {
                    error!(step = step.name(), error = %err, "Step halted the build");
                    events.push(
                        Event::new(ctx.run_id, step.name(), EventType::StepHalted)
                            .with_error(err.to_string()),
                    );
                    state.error = Some(err);
                    outcome = RunOutcome::Halted;
                    break;
                }
            }
        }

        if outcome == RunOutcome::Halted {
            self.unwind(completed, state, ctx, &mut events).await;
        }

        RunReport {
            run_id: ctx.run_id,
            outcome,
            events,
        }
    }

    /// Clean up the first `completed` steps in reverse order
    async fn unwind(
        &self,
        completed: usize,
        state: &mut BuildState,
        ctx: &StepContext,
        events: &mut Vec<Event>,
    ) {
        let cleanup_ctx = ctx.detached();

        for step in self.steps[..completed].iter().rev() {
            match step.cleanup(state, &cleanup_ctx).await {
                Ok(()) => {
                    events.push(Event::new(ctx.run_id, step.name(), EventType::CleanedUp));
                }
                Err(err) => {
                    warn!(step = step.name(), error = %err, "Cleanup failed");
                    state
                        .cleanup_warnings
                        .push(format!("{}: {}", step.name(), err));
                    events.push(
                        Event::new(ctx.run_id, step.name(), EventType::CleanupFailed)
                            .with_error(err.to_string()),
                    );
                }
            }
        }
    }
}
