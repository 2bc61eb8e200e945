//! Compute instance: datacenter, public LAN, and a server with one boot
//! volume and one DHCP NIC.
//!
//! The datacenter id is recorded as soon as the provider returns it, so a
//! failure anywhere later still leaves something to delete. Removing the
//! datacenter reclaims everything nested in it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::adapters::ResourceClient;
use crate::config::BuildConfig;
use crate::core::{BuildError, BuildState, Poller, Step, StepAction, StepContext};
use crate::domain::{
    Collection, Datacenter, DatacenterProperties, Image, Lan, LanProperties, Nic, NicProperties,
    Server, ServerEntities, ServerProperties, TrackingHandle, Volume, VolumeProperties,
};

const DATACENTER_DESCRIPTION: &str = "snapforge build datacenter";

/// Image type to filter on for a configured disk type.
///
/// The public catalog lists its images as `HDD`, so an `SSD` volume still
/// boots from an `HDD` image.
pub fn image_type_for(disk_type: &str) -> &str {
    if disk_type == "SSD" {
        "HDD"
    } else {
        disk_type
    }
}

/// First public image whose name contains `name` (ignoring case) and whose
/// type and location match. `None` when nothing matches.
pub fn select_image<'a>(
    images: &'a [Image],
    name: &str,
    disk_type: &str,
    location: &str,
) -> Option<&'a Image> {
    let wanted = name.to_lowercase();
    let image_type = image_type_for(disk_type);

    images.iter().find(|image| {
        let props = &image.properties;
        props
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .is_some_and(|n| n.to_lowercase().contains(&wanted))
            && props.image_type.as_deref() == Some(image_type)
            && props.location.as_deref() == Some(location)
            && props.public
    })
}

fn require_handle(handle: Option<TrackingHandle>, operation: &str) -> Result<TrackingHandle, BuildError> {
    handle.ok_or_else(|| BuildError::MissingHandle {
        operation: operation.to_string(),
    })
}

fn server_request(
    config: &BuildConfig,
    image: Option<String>,
    lan_id: u32,
    public_key: Option<&str>,
) -> Server {
    let volume = Volume {
        id: None,
        properties: VolumeProperties {
            name: Some(config.snapshot_name.clone()),
            disk_type: Some(config.disk_type.clone()),
            size: Some(config.disk_size),
            image,
            image_password: config.ssh.password.clone(),
            ssh_keys: public_key.map(str::to_string).into_iter().collect(),
            licence_type: None,
        },
    };
    let nic = Nic {
        id: None,
        properties: NicProperties {
            name: Some(config.snapshot_name.clone()),
            dhcp: Some(true),
            lan: Some(lan_id),
            ips: Vec::new(),
        },
    };

    Server {
        id: None,
        properties: ServerProperties {
            name: Some(config.snapshot_name.clone()),
            cores: Some(config.cores),
            ram: Some(config.ram),
            boot_volume: None,
        },
        entities: Some(ServerEntities {
            volumes: Some(Collection::of(vec![volume])),
            nics: Some(Collection::of(vec![nic])),
        }),
    }
}

/// Delete the recorded build datacenter and wait for it to disappear.
///
/// No-op when nothing is recorded. The id is cleared once the datacenter is
/// gone, so calling this twice deletes once.
pub async fn teardown_datacenter(
    client: &dyn ResourceClient,
    poller: &Poller,
    state: &mut BuildState,
) -> Result<(), BuildError> {
    let Some(datacenter_id) = state.datacenter_id.clone() else {
        return Ok(());
    };

    info!(datacenter = %datacenter_id, "Removing build datacenter");
    delete_and_wait(client, poller, &datacenter_id)
        .await
        .map_err(|e| BuildError::LeftBehind {
            resource: format!("datacenter {}", datacenter_id),
            source: Box::new(e),
        })?;

    state.datacenter_id = None;
    info!(datacenter = %datacenter_id, "Build datacenter deleted");
    Ok(())
}

async fn delete_and_wait(
    client: &dyn ResourceClient,
    poller: &Poller,
    datacenter_id: &str,
) -> Result<(), BuildError> {
    match poller
        .guard("delete datacenter", client.delete_datacenter(datacenter_id))
        .await?
    {
        Ok(_) => poller.await_datacenter_deleted(client, datacenter_id).await,
        // already gone
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(BuildError::remote("delete datacenter", e)),
    }
}

/// Creates the build server
pub struct CreateServerStep {
    client: Arc<dyn ResourceClient>,
}

impl CreateServerStep {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    async fn resolve_image(
        &self,
        config: &BuildConfig,
        ctx: &StepContext,
    ) -> Result<Option<String>, BuildError> {
        let images = ctx.call("list images", self.client.list_images()).await?;

        let selected = select_image(&images, &config.image, &config.disk_type, &config.location);
        match selected {
            Some(image) => {
                info!(
                    image = %image.id,
                    name = image.properties.name.as_deref().unwrap_or_default(),
                    "Selected source image"
                );
                Ok(Some(image.id.clone()))
            }
            None => {
                warn!(
                    image = %config.image,
                    disk_type = %config.disk_type,
                    location = %config.location,
                    "No public image matches, creating the volume without one"
                );
                Ok(None)
            }
        }
    }

    async fn create(&self, state: &mut BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        let client = self.client.as_ref();
        let config = state.config.clone();
        let image = self.resolve_image(&config, ctx).await?;

        info!(name = %config.snapshot_name, location = %config.location, "Creating datacenter");
        let datacenter = Datacenter {
            id: None,
            metadata: None,
            properties: DatacenterProperties {
                name: config.snapshot_name.clone(),
                description: Some(DATACENTER_DESCRIPTION.to_string()),
                location: config.location.clone(),
            },
        };
        let submitted = ctx
            .call("create datacenter", client.create_datacenter(&datacenter))
            .await?;
        let datacenter_id = submitted
            .resource
            .id
            .ok_or_else(|| BuildError::unexpected("create datacenter", "no datacenter id"))?;
        state.datacenter_id = Some(datacenter_id.clone());
        let handle = require_handle(submitted.handle, "create datacenter")?;
        ctx.poller.await_request(client, &handle).await?;

        info!(datacenter = %datacenter_id, "Creating LAN");
        let lan = Lan {
            id: None,
            properties: LanProperties {
                name: Some(config.snapshot_name.clone()),
                public: true,
            },
        };
        let submitted = ctx
            .call("create LAN", client.create_lan(&datacenter_id, &lan))
            .await?;
        let handle = require_handle(submitted.handle, "create LAN")?;
        let raw_lan_id = submitted
            .resource
            .id
            .ok_or_else(|| BuildError::unexpected("create LAN", "no LAN id"))?;
        let lan_id: u32 = raw_lan_id.parse().map_err(|_| {
            BuildError::unexpected("create LAN", format!("LAN id '{}' is not a number", raw_lan_id))
        })?;
        ctx.poller.await_request(client, &handle).await?;

        info!(datacenter = %datacenter_id, lan = lan_id, "Creating server");
        let request = server_request(&config, image, lan_id, state.public_key());
        let submitted = ctx
            .call("create server", client.create_server(&datacenter_id, &request))
            .await?;
        let handle = require_handle(submitted.handle, "create server")?;
        let created = submitted.resource;
        let server_id = created
            .id
            .clone()
            .ok_or_else(|| BuildError::unexpected("create server", "no server id"))?;
        let volume_id = created
            .volumes()
            .first()
            .and_then(|v| v.id.clone())
            .ok_or_else(|| BuildError::unexpected("create server", "no boot volume id"))?;
        ctx.poller.await_request(client, &handle).await?;
        state.volume_id = Some(volume_id);

        let server = ctx
            .call("get server", client.get_server(&datacenter_id, &server_id))
            .await?;
        let server_ip = server
            .primary_ip()
            .ok_or_else(|| BuildError::unexpected("get server", "server NIC has no IP address"))?
            .to_string();

        info!(server = %server_id, ip = %server_ip, "Server created");
        state.instance_id = Some(server.id.unwrap_or(server_id));
        state.server_ip = Some(server_ip);
        Ok(())
    }
}

#[async_trait]
impl Step for CreateServerStep {
    fn name(&self) -> &str {
        "create-server"
    }

    async fn run(&self, state: &mut BuildState, ctx: &StepContext) -> StepAction {
        match self.create(state, ctx).await {
            Ok(()) => StepAction::Continue,
            Err(err) => {
                // The runner only unwinds completed steps; remove what this
                // run left behind here.
                let poller = ctx.poller.detached();
                if let Err(cleanup) = teardown_datacenter(self.client.as_ref(), &poller, state).await {
                    warn!(error = %cleanup, "Cleanup after failed server creation failed");
                    state
                        .cleanup_warnings
                        .push(format!("{}: {}", self.name(), cleanup));
                }
                StepAction::Halt(err)
            }
        }
    }

    async fn cleanup(&self, state: &mut BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        teardown_datacenter(self.client.as_ref(), &ctx.poller, state).await
    }
}
