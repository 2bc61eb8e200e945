//! Shared fakes for integration tests.
//!
//! [`FakeCloud`] answers every provider call from memory and logs it to a
//! shared journal; [`FakeSession`] logs remote commands to the same journal
//! so tests can assert on the order of cloud calls and SSH commands.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use snapforge::adapters::{ClientError, ClientResult, RemoteSession, ResourceClient};
use snapforge::config::{BuildConfig, SshConfig};
use snapforge::core::{BuildError, Builder, CancelToken, PollSettings, StepContext};
use snapforge::domain::{
    Collection, Datacenter, Image, ImageProperties, Lan, Metadata, Nic, NicProperties,
    RequestStatus, ResourceReference, Server, ServerEntities, ServerProperties, Snapshot,
    Submitted, TrackingHandle, Volume, VolumeProperties,
};
use snapforge::steps::Connector;

pub const DATACENTER_ID: &str = "dc-1";
pub const SERVER_ID: &str = "srv-1";
pub const VOLUME_ID: &str = "vol-1";
pub const SNAPSHOT_ID: &str = "snap-1";
pub const SERVER_IP: &str = "203.0.113.10";
pub const IMAGE_ID: &str = "img-ubuntu";

/// Ordered log of cloud calls and remote commands
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct CloudState {
    /// Requests (by operation) whose poll ends in FAILED, with the reason
    failing: HashMap<String, String>,
    /// Requests that never leave RUNNING
    stuck: HashSet<String>,
    /// Mutations answered without a Location header
    no_handle: HashSet<String>,
    /// Calls that never return
    hanging: HashSet<String>,
    /// Datacenters already removed
    deleted: HashSet<String>,
    delete_calls: u32,
    delete_fails: bool,
    licence_type: String,
    created_server: Option<Server>,
}

/// In-memory IONOS Cloud
pub struct FakeCloud {
    pub journal: Journal,
    images: Vec<Image>,
    state: Mutex<CloudState>,
}

pub fn image(id: &str, name: &str, image_type: &str, location: &str, public: bool) -> Image {
    Image {
        id: id.to_string(),
        properties: ImageProperties {
            name: Some(name.to_string()),
            image_type: Some(image_type.to_string()),
            location: Some(location.to_string()),
            public,
        },
    }
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            journal: Arc::new(Mutex::new(Vec::new())),
            images: vec![
                image("img-private", "ubuntu-22.04-custom", "HDD", "us/las", false),
                image(IMAGE_ID, "Ubuntu-22.04-server", "HDD", "us/las", true),
                image("img-fra", "Ubuntu-22.04-server", "HDD", "de/fra", true),
            ],
            state: Mutex::new(CloudState {
                licence_type: "LINUX".to_string(),
                ..Default::default()
            }),
        })
    }

    /// Make the request for `operation` end in FAILED
    pub fn fail_request(&self, operation: &str, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(operation.to_string(), reason.to_string());
    }

    /// Make the request for `operation` never finish
    pub fn stall_request(&self, operation: &str) {
        self.state.lock().unwrap().stuck.insert(operation.to_string());
    }

    /// Answer `operation` without a tracking handle
    pub fn drop_handle(&self, operation: &str) {
        self.state
            .lock()
            .unwrap()
            .no_handle
            .insert(operation.to_string());
    }

    /// Make every call to `call` (e.g. "get_volume") hang forever
    pub fn hang_call(&self, call: &str) {
        self.state.lock().unwrap().hanging.insert(call.to_string());
    }

    pub fn fail_deletes(&self) {
        self.state.lock().unwrap().delete_fails = true;
    }

    pub fn set_licence_type(&self, licence_type: &str) {
        self.state.lock().unwrap().licence_type = licence_type.to_string();
    }

    pub fn delete_calls(&self) -> u32 {
        self.state.lock().unwrap().delete_calls
    }

    pub fn datacenter_exists(&self) -> bool {
        self.journal().iter().any(|c| c == "create_datacenter")
            && !self.state.lock().unwrap().deleted.contains(DATACENTER_ID)
    }

    /// Server request as submitted
    pub fn created_server(&self) -> Option<Server> {
        self.state.lock().unwrap().created_server.clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn calls(&self, name: &str) -> usize {
        self.journal().iter().filter(|c| c.as_str() == name).count()
    }

    /// Record `call`, then hang if it was told to
    async fn enter(&self, call: &str) {
        self.journal.lock().unwrap().push(call.to_string());
        let hangs = self.state.lock().unwrap().hanging.contains(call);
        if hangs {
            std::future::pending::<()>().await;
        }
    }

    fn submitted<T>(&self, operation: &str, resource: T) -> Submitted<T> {
        let handle = if self.state.lock().unwrap().no_handle.contains(operation) {
            None
        } else {
            Some(TrackingHandle::new(format!(
                "https://api.example.test/requests/{}/status",
                operation
            )))
        };
        Submitted::new(resource, handle)
    }
}

fn operation_of(handle: &TrackingHandle) -> String {
    handle
        .as_str()
        .trim_end_matches("/status")
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ResourceClient for FakeCloud {
    async fn create_datacenter(&self, datacenter: &Datacenter) -> ClientResult<Submitted<Datacenter>> {
        self.enter("create_datacenter").await;
        let mut created = datacenter.clone();
        created.id = Some(DATACENTER_ID.to_string());
        Ok(self.submitted("datacenter", created))
    }

    async fn get_datacenter(&self, datacenter_id: &str) -> ClientResult<Datacenter> {
        self.enter("get_datacenter").await;
        if self.state.lock().unwrap().deleted.contains(datacenter_id) {
            return Err(ClientError::NotFound(format!("datacenters/{}", datacenter_id)));
        }
        Ok(Datacenter {
            id: Some(datacenter_id.to_string()),
            ..Default::default()
        })
    }

    async fn delete_datacenter(&self, datacenter_id: &str) -> ClientResult<Option<TrackingHandle>> {
        self.enter("delete_datacenter").await;
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        if state.delete_fails {
            return Err(ClientError::Status {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        if !state.deleted.insert(datacenter_id.to_string()) {
            return Err(ClientError::NotFound(format!("datacenters/{}", datacenter_id)));
        }
        Ok(Some(TrackingHandle::new("https://api.example.test/requests/delete/status")))
    }

    async fn create_lan(&self, _datacenter_id: &str, lan: &Lan) -> ClientResult<Submitted<Lan>> {
        self.enter("create_lan").await;
        let mut created = lan.clone();
        created.id = Some("1".to_string());
        Ok(self.submitted("lan", created))
    }

    async fn create_server(&self, _datacenter_id: &str, server: &Server) -> ClientResult<Submitted<Server>> {
        self.enter("create_server").await;
        self.state.lock().unwrap().created_server = Some(server.clone());

        let mut created = server.clone();
        created.id = Some(SERVER_ID.to_string());
        if let Some(volumes) = created
            .entities
            .as_mut()
            .and_then(|e| e.volumes.as_mut())
        {
            for volume in &mut volumes.items {
                volume.id = Some(VOLUME_ID.to_string());
            }
        }
        Ok(self.submitted("server", created))
    }

    async fn get_server(&self, _datacenter_id: &str, server_id: &str) -> ClientResult<Server> {
        self.enter("get_server").await;
        Ok(Server {
            id: Some(server_id.to_string()),
            properties: ServerProperties {
                boot_volume: Some(ResourceReference {
                    id: VOLUME_ID.to_string(),
                }),
                ..Default::default()
            },
            entities: Some(ServerEntities {
                volumes: None,
                nics: Some(Collection::of(vec![Nic {
                    id: Some("nic-1".to_string()),
                    properties: NicProperties {
                        ips: vec![SERVER_IP.to_string()],
                        ..Default::default()
                    },
                }])),
            }),
        })
    }

    async fn get_volume(&self, _datacenter_id: &str, volume_id: &str) -> ClientResult<Volume> {
        self.enter("get_volume").await;
        Ok(Volume {
            id: Some(volume_id.to_string()),
            properties: VolumeProperties {
                licence_type: Some(self.state.lock().unwrap().licence_type.clone()),
                ..Default::default()
            },
        })
    }

    async fn list_images(&self) -> ClientResult<Vec<Image>> {
        self.enter("list_images").await;
        Ok(self.images.clone())
    }

    async fn create_snapshot(
        &self,
        _datacenter_id: &str,
        _volume_id: &str,
        _name: &str,
    ) -> ClientResult<Submitted<Snapshot>> {
        self.enter("create_snapshot").await;
        Ok(self.submitted(
            "snapshot",
            Snapshot {
                id: Some(SNAPSHOT_ID.to_string()),
                ..Default::default()
            },
        ))
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> ClientResult<Snapshot> {
        self.enter("get_snapshot").await;
        Ok(Snapshot {
            id: Some(snapshot_id.to_string()),
            metadata: Some(Metadata {
                state: Some("AVAILABLE".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn get_request_status(&self, handle: &TrackingHandle) -> ClientResult<RequestStatus> {
        let operation = operation_of(handle);
        let state = self.state.lock().unwrap();
        if state.stuck.contains(&operation) {
            return Ok(RequestStatus::new("RUNNING", None));
        }
        match state.failing.get(&operation) {
            Some(reason) => Ok(RequestStatus::new("FAILED", Some(reason.clone()))),
            None => Ok(RequestStatus::new("DONE", None)),
        }
    }
}

/// Remote session writing commands into the cloud journal
pub struct FakeSession {
    journal: Journal,
    exit_codes: HashMap<String, i32>,
    hanging: HashSet<String>,
}

impl FakeSession {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            exit_codes: HashMap::new(),
            hanging: HashSet::new(),
        }
    }

    pub fn exit_with(mut self, command: &str, code: i32) -> Self {
        self.exit_codes.insert(command.to_string(), code);
        self
    }

    /// `command` starts but never exits
    pub fn hang_on(mut self, command: &str) -> Self {
        self.hanging.insert(command.to_string());
        self
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn run(&self, command: &str) -> anyhow::Result<i32> {
        self.journal.lock().unwrap().push(format!("ssh: {}", command));
        if self.hanging.contains(command) {
            std::future::pending::<()>().await;
        }
        Ok(self.exit_codes.get(command).copied().unwrap_or(0))
    }
}

/// Hands out one shared [`FakeSession`]
pub struct FakeConnector {
    session: Arc<FakeSession>,
    pub hosts: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(session: FakeSession) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(session),
            hosts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        host: &str,
        _config: &SshConfig,
        _ctx: &StepContext,
    ) -> Result<Arc<dyn RemoteSession>, BuildError> {
        self.hosts.lock().unwrap().push(host.to_string());
        Ok(self.session.clone())
    }
}

pub fn config() -> BuildConfig {
    let mut config = BuildConfig::from_yaml(
        r#"
username: ops@example.com
password: secret
image: ubuntu-22.04
snapshot_name: golden
location: us/las
disk_type: HDD
ssh:
  password: hunter2
provision:
  - apt-get update
"#,
    )
    .unwrap();
    config.resolve_with(|_| None);
    config
}

pub fn fast_polling() -> PollSettings {
    PollSettings::fixed(Duration::from_millis(1), Duration::from_secs(5))
}

/// Cancel `token` after `delay`
pub fn cancel_after(token: &CancelToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

/// Builder over `cloud` with a fake SSH session and millisecond polling
pub fn builder(cloud: &Arc<FakeCloud>, config: BuildConfig) -> (Builder, Arc<FakeConnector>) {
    let connector = FakeConnector::new(FakeSession::new(cloud.journal.clone()));
    let builder = Builder::new(config, cloud.clone())
        .with_connector(connector.clone())
        .with_poll_settings(fast_polling());
    (builder, connector)
}
