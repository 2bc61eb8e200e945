//! Per-run state shared between steps.
//!
//! Fields are filled in pipeline order. A step may only read a field that
//! an earlier step is guaranteed to have set; the `require_*` accessors turn
//! a violation of that contract into [`BuildError::MissingState`].

use std::sync::Arc;

use super::error::BuildError;
use crate::adapters::RemoteSession;
use crate::config::BuildConfig;
use crate::steps::KeyMaterial;

/// Everything steps hand to each other during one build
pub struct BuildState {
    /// Resolved user configuration
    pub config: BuildConfig,

    /// Parsed SSH key pair, when a private key file is configured
    pub key: Option<KeyMaterial>,

    /// Build datacenter; its presence means there is something to clean up
    pub datacenter_id: Option<String>,

    /// Boot volume of the build server
    pub volume_id: Option<String>,

    /// Build server
    pub instance_id: Option<String>,

    /// First address of the build server's NIC
    pub server_ip: Option<String>,

    /// Command channel into the build server
    pub session: Option<Arc<dyn RemoteSession>>,

    /// Snapshot created from the boot volume
    pub snapshot_id: Option<String>,

    /// Error that halted the pipeline
    pub error: Option<BuildError>,

    /// Cleanup problems, reported after the halting error
    pub cleanup_warnings: Vec<String>,
}

fn require<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, BuildError> {
    field.as_deref().ok_or(BuildError::MissingState(name))
}

impl BuildState {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            key: None,
            datacenter_id: None,
            volume_id: None,
            instance_id: None,
            server_ip: None,
            session: None,
            snapshot_id: None,
            error: None,
            cleanup_warnings: Vec::new(),
        }
    }

    pub fn require_datacenter_id(&self) -> Result<&str, BuildError> {
        require(&self.datacenter_id, "datacenter_id")
    }

    pub fn require_volume_id(&self) -> Result<&str, BuildError> {
        require(&self.volume_id, "volume_id")
    }

    pub fn require_instance_id(&self) -> Result<&str, BuildError> {
        require(&self.instance_id, "instance_id")
    }

    pub fn require_server_ip(&self) -> Result<&str, BuildError> {
        require(&self.server_ip, "server_ip")
    }

    /// OpenSSH public key line to install on the server, if any
    pub fn public_key(&self) -> Option<&str> {
        self.key.as_ref().map(|k| k.public_key.as_str())
    }

    pub fn is_halted(&self) -> bool {
        self.error.is_some()
    }
}
