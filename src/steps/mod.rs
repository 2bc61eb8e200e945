//! Build steps, in pipeline order:
//!
//! 1. [`SshKeyStep`]: parse the configured private key
//! 2. [`CreateServerStep`]: datacenter, LAN, server and boot volume
//! 3. [`ConnectStep`]: wait for SSH and open a session
//! 4. [`ProvisionStep`]: run the provisioning commands
//! 5. [`SnapshotStep`]: sync and snapshot the boot volume

pub mod create_server;
pub mod remote;
pub mod snapshot;
pub mod ssh_key;

pub use create_server::{select_image, teardown_datacenter, CreateServerStep};
pub use remote::{ConnectStep, Connector, ProvisionStep, SshConnector};
pub use snapshot::SnapshotStep;
pub use ssh_key::{KeyMaterial, SshKeyStep};
