//! Build error types.
//!
//! Every step-local failure becomes a [`BuildError`] carried by a halt
//! verdict. The runner does not branch on the kind; it only records the
//! error and unwinds.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::ClientError;

/// Errors that halt a build
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no tracking handle in the response to {operation}")]
    MissingHandle { operation: String },

    #[error("{operation} failed: {source}")]
    Remote {
        operation: String,
        #[source]
        source: ClientError,
    },

    #[error("request {handle} failed: {reason}")]
    RemoteFailed { handle: String, reason: String },

    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("cancelled while waiting for {what}")]
    Cancelled { what: String },

    #[error("remote command `{command}` exited with status {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("remote session error: {0}")]
    Session(String),

    #[error("no remote session to the build server")]
    NoSession,

    #[error("{0} was not recorded by an earlier step")]
    MissingState(&'static str),

    #[error("unexpected response from {operation}: {detail}")]
    UnexpectedResponse { operation: String, detail: String },

    #[error("could not remove {resource}, destroy it manually: {source}")]
    LeftBehind {
        resource: String,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    pub fn remote(operation: impl Into<String>, source: ClientError) -> Self {
        Self::Remote {
            operation: operation.into(),
            source,
        }
    }

    pub fn unexpected(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn cancelled(what: impl Into<String>) -> Self {
        Self::Cancelled { what: what.into() }
    }

    /// True for the provider reporting a request as failed
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Self::RemoteFailed { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// A failed build: the error that halted it plus any cleanup warnings.
///
/// The halting error is always what is reported; warnings are appended.
#[derive(Debug)]
pub struct BuildFailure {
    pub error: BuildError,
    pub cleanup_warnings: Vec<String>,
}

impl BuildFailure {
    pub fn new(error: BuildError, cleanup_warnings: Vec<String>) -> Self {
        Self {
            error,
            cleanup_warnings,
        }
    }
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "build failed: {}", self.error)?;
        for warning in &self.cleanup_warnings {
            write!(f, "\n  cleanup warning: {}", warning)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
