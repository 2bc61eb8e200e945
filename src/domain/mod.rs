//! Domain types for snapforge.
//!
//! - Resources: IONOS Cloud API payloads and tracking handles
//! - Events: the in-memory step journal
//! - Artifact: what a successful build produces

pub mod artifact;
pub mod events;
pub mod resources;

pub use artifact::{
    Artifact, DATA_DATACENTER_ID, DATA_INSTANCE_ID, DATA_SERVER_IP, DATA_VOLUME_ID,
};
pub use events::{Event, EventType};
pub use resources::{
    Collection, Datacenter, DatacenterProperties, Image, ImageProperties, Lan, LanProperties,
    Metadata, Nic, NicProperties, RequestStatus, ResourceReference, Server, ServerEntities,
    ServerProperties, Snapshot, SnapshotProperties, Submitted, TrackingHandle, Volume,
    VolumeProperties, REQUEST_DONE, REQUEST_FAILED, STATE_AVAILABLE,
};
