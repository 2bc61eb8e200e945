//! snapforge - build IONOS Cloud snapshots from a disposable server
//!
//! A build provisions one throwaway server, customizes it over SSH, and
//! captures its boot volume as a reusable snapshot. The build datacenter is
//! removed afterwards, and on any failure.
//!
//! # Architecture
//!
//! The build is a linear pipeline of steps sharing one typed state record:
//! - Every remote mutation is submitted, then polled to completion
//! - The first failing step halts the pipeline
//! - Completed steps are then cleaned up in reverse order
//!
//! # Modules
//!
//! - `adapters`: IONOS Cloud API client and SSH sessions
//! - `core`: Runner, poller, shared state and the builder
//! - `steps`: The individual build steps
//! - `domain`: API payloads, step journal, artifact
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Check a config file
//! snapforge validate snapforge.yaml
//!
//! # See which image a build would start from
//! snapforge images snapforge.yaml
//!
//! # Build a snapshot
//! snapforge build snapforge.yaml --snapshot-name golden-2024
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod steps;

// Re-export main types at crate root for convenience
pub use config::BuildConfig;
pub use core::{BuildError, BuildFailure, Builder, CancelToken};
pub use domain::Artifact;
