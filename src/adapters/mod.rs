//! Adapter interfaces for external systems.
//!
//! - [`ResourceClient`]: the cloud provider API
//! - [`RemoteSession`]: command execution inside the build server

pub mod ionos;
pub mod ssh;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    Datacenter, Image, Lan, RequestStatus, Server, Snapshot, Submitted, TrackingHandle, Volume,
};

pub use ionos::IonosClient;
pub use ssh::SshSession;

/// Errors from a single provider call
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Cloud provider API.
///
/// Mutating calls return the accepted payload plus the tracking handle of
/// the provider request, which completes asynchronously. Implementations
/// must treat any HTTP status >= 300 as an error.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn create_datacenter(&self, datacenter: &Datacenter) -> ClientResult<Submitted<Datacenter>>;

    async fn get_datacenter(&self, datacenter_id: &str) -> ClientResult<Datacenter>;

    async fn delete_datacenter(&self, datacenter_id: &str) -> ClientResult<Option<TrackingHandle>>;

    async fn create_lan(&self, datacenter_id: &str, lan: &Lan) -> ClientResult<Submitted<Lan>>;

    async fn create_server(&self, datacenter_id: &str, server: &Server) -> ClientResult<Submitted<Server>>;

    async fn get_server(&self, datacenter_id: &str, server_id: &str) -> ClientResult<Server>;

    async fn get_volume(&self, datacenter_id: &str, volume_id: &str) -> ClientResult<Volume>;

    async fn list_images(&self) -> ClientResult<Vec<Image>>;

    async fn create_snapshot(
        &self,
        datacenter_id: &str,
        volume_id: &str,
        name: &str,
    ) -> ClientResult<Submitted<Snapshot>>;

    async fn get_snapshot(&self, snapshot_id: &str) -> ClientResult<Snapshot>;

    async fn get_request_status(&self, handle: &TrackingHandle) -> ClientResult<RequestStatus>;
}

/// A command channel into the build server
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Start `command` and wait for its exit status
    async fn run(&self, command: &str) -> anyhow::Result<i32>;
}
