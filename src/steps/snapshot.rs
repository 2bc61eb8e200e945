//! Image capture: snapshot the boot volume of the build server.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::remote::run_checked;
use crate::adapters::ResourceClient;
use crate::core::{BuildError, BuildState, Step, StepAction, StepContext};

/// Command flushing guest writes before capture
pub const SYNC_COMMAND: &str = "sync";

/// Whether a volume licence type calls for a filesystem sync
pub fn needs_sync(licence_type: &str) -> bool {
    licence_type.eq_ignore_ascii_case("linux")
}

/// Delete the line carrying `key_blob` from the login user's
/// `authorized_keys`. Base64 never contains `#`, so it is a safe delimiter.
pub fn remove_key_command(key_blob: &str) -> String {
    format!(
        "sed -i.bak '\\#{}#d' ~/.ssh/authorized_keys && rm -f ~/.ssh/authorized_keys.bak",
        key_blob
    )
}

/// Last remote command before capture, if any.
///
/// Key removal and sync share one invocation: once the key is gone, a new
/// connection authenticated with it would be refused.
pub fn pre_capture_command(licence_type: &str, remove_key: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(blob) = remove_key {
        parts.push(remove_key_command(blob));
    }
    if needs_sync(licence_type) {
        parts.push(SYNC_COMMAND.to_string());
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" && "))
    }
}

/// Creates the snapshot and waits until it is usable
pub struct SnapshotStep {
    client: Arc<dyn ResourceClient>,
}

impl SnapshotStep {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    /// Licence type of the server's boot volume
    async fn guest_os(
        &self,
        datacenter_id: &str,
        server_id: &str,
        ctx: &StepContext,
    ) -> Result<String, BuildError> {
        let server = ctx
            .call("get server", self.client.get_server(datacenter_id, server_id))
            .await?;
        let boot_volume = server
            .properties
            .boot_volume
            .ok_or_else(|| BuildError::unexpected("get server", "server has no boot volume"))?;

        let volume = ctx
            .call("get volume", self.client.get_volume(datacenter_id, &boot_volume.id))
            .await?;

        volume
            .properties
            .licence_type
            .ok_or_else(|| BuildError::unexpected("get volume", "boot volume has no licence type"))
    }

    async fn capture(&self, state: &mut BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        let session = state.session.clone().ok_or(BuildError::NoSession)?;
        let datacenter_id = state.require_datacenter_id()?.to_string();
        let volume_id = state.require_volume_id()?.to_string();
        let server_id = state.require_instance_id()?.to_string();
        let name = state.config.snapshot_name.clone();

        let os = self.guest_os(&datacenter_id, &server_id, ctx).await?;
        info!(%os, "Resolved guest OS");

        let remove_key = if state.config.ssh.clear_authorized_keys {
            state.key.as_ref().map(|k| k.key_blob().to_string())
        } else {
            None
        };
        if let Some(command) = pre_capture_command(&os, remove_key.as_deref()) {
            if remove_key.is_some() {
                info!("Removing build key from authorized_keys");
            }
            if needs_sync(&os) {
                info!("Syncing file system changes");
            }
            run_checked(session.as_ref(), &command, ctx).await?;
        }

        info!(datacenter = %datacenter_id, volume = %volume_id, %name, "Creating snapshot");
        let submitted = ctx
            .call(
                "create snapshot",
                self.client.create_snapshot(&datacenter_id, &volume_id, &name),
            )
            .await?;
        let handle = submitted.handle.ok_or_else(|| BuildError::MissingHandle {
            operation: "create snapshot".to_string(),
        })?;
        let snapshot_id = submitted
            .resource
            .id
            .ok_or_else(|| BuildError::unexpected("create snapshot", "no snapshot id"))?;

        ctx.poller.await_request(self.client.as_ref(), &handle).await?;
        state.snapshot_id = Some(snapshot_id.clone());

        info!(snapshot = %snapshot_id, "Waiting for snapshot to become available");
        ctx.poller
            .await_snapshot_available(self.client.as_ref(), &snapshot_id)
            .await?;

        info!(snapshot = %snapshot_id, %name, "Snapshot available");
        Ok(())
    }
}

#[async_trait]
impl Step for SnapshotStep {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn run(&self, state: &mut BuildState, ctx: &StepContext) -> StepAction {
        self.capture(state, ctx).await.into()
    }
}
