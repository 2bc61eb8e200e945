//! Step journal for a single build run.
//!
//! The runner appends one event per step transition. The journal lives in
//! memory for the duration of the run and is handed back with the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single step transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Name of the step
    pub step: String,

    /// Type of event
    pub event_type: EventType,

    /// Error message if the step halted or its cleanup failed
    pub error: Option<String>,
}

impl Event {
    pub fn new(run_id: Uuid, step: impl Into<String>, event_type: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id,
            step: step.into(),
            event_type,
            error: None,
        }
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events recorded during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// `run` was entered
    StepStarted,

    /// `run` returned continue
    StepCompleted,

    /// `run` returned halt
    StepHalted,

    /// `cleanup` finished without error
    CleanedUp,

    /// `cleanup` reported an error (downgraded to a warning)
    CleanupFailed,
}
