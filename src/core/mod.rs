//! Core build engine.
//!
//! This module contains:
//! - Runner: ordered steps with reverse-order compensating cleanup
//! - Poller: submit-then-poll waits with deadline and cancellation
//! - State: the typed record steps share
//! - Builder: the snapshot pipeline itself

pub mod builder;
pub mod cancel;
pub mod error;
pub mod poller;
pub mod runner;
pub mod state;

pub use builder::Builder;
pub use cancel::CancelToken;
pub use error::{BuildError, BuildFailure};
pub use poller::{PollSettings, Poller, Probe};
pub use runner::{PipelineRunner, RunOutcome, RunReport, Step, StepAction, StepContext};
pub use state::BuildState;
