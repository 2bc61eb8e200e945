//! Wire shapes for the IONOS Cloud API resources the build touches.
//!
//! Every field is optional because the same types are used for request
//! bodies (sparse) and responses (server-filled), mirroring how the
//! provider's own SDKs model them.

use serde::{Deserialize, Serialize};

/// Request status values reported by `/requests/{id}/status`
pub const REQUEST_DONE: &str = "DONE";
pub const REQUEST_FAILED: &str = "FAILED";

/// Resource state reported once a resource is usable
pub const STATE_AVAILABLE: &str = "AVAILABLE";

/// Opaque reference to an in-flight provider request.
///
/// Taken from the `Location` header of a mutating response; it is the URL
/// of the request's status resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingHandle(String);

impl TrackingHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of an accepted mutating call plus its tracking handle, if the
/// response carried one
#[derive(Debug, Clone)]
pub struct Submitted<T> {
    pub resource: T,
    pub handle: Option<TrackingHandle>,
}

impl<T> Submitted<T> {
    pub fn new(resource: T, handle: Option<TrackingHandle>) -> Self {
        Self { resource, handle }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Status of a provider request (`GET /requests/{id}/status`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestStatus {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RequestStatus {
    pub fn new(status: impl Into<String>, message: Option<String>) -> Self {
        Self {
            id: None,
            metadata: Metadata {
                status: Some(status.into()),
                message,
                ..Default::default()
            },
        }
    }

    pub fn status(&self) -> &str {
        self.metadata.status.as_deref().unwrap_or_default()
    }
}

/// List wrapper used by every collection endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Collection<T> {
    pub fn of(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Datacenter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub properties: DatacenterProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatacenterProperties {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub properties: LanProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Server {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub properties: ServerProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<ServerEntities>,
}

impl Server {
    pub fn volumes(&self) -> &[Volume] {
        self.entities
            .as_ref()
            .and_then(|e| e.volumes.as_ref())
            .map(|c| c.items.as_slice())
            .unwrap_or_default()
    }

    pub fn nics(&self) -> &[Nic] {
        self.entities
            .as_ref()
            .and_then(|e| e.nics.as_ref())
            .map(|c| c.items.as_slice())
            .unwrap_or_default()
    }

    /// First address assigned to the first NIC
    pub fn primary_ip(&self) -> Option<&str> {
        self.nics()
            .first()
            .and_then(|nic| nic.properties.ips.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_volume: Option<ResourceReference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceReference {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerEntities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Collection<Volume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nics: Option<Collection<Nic>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub properties: VolumeProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_password: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licence_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Nic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub properties: NicProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NicProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lan: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub properties: ImageProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProperties {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub properties: SnapshotProperties,
}

impl Snapshot {
    pub fn state(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.state.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_response_parsing() {
        let json = r#"{
            "id": "srv-1",
            "properties": {"name": "build", "cores": 4, "ram": 2048, "bootVolume": {"id": "vol-1"}},
            "entities": {
                "volumes": {"items": [{"id": "vol-1", "properties": {"type": "HDD", "size": 50}}]},
                "nics": {"items": [{"id": "nic-1", "properties": {"dhcp": true, "lan": 1, "ips": ["203.0.113.10"]}}]}
            }
        }"#;

        let server: Server = serde_json::from_str(json).unwrap();
        assert_eq!(server.id.as_deref(), Some("srv-1"));
        assert_eq!(server.properties.boot_volume.as_ref().unwrap().id, "vol-1");
        assert_eq!(server.volumes().len(), 1);
        assert_eq!(server.primary_ip(), Some("203.0.113.10"));
    }

    #[test]
    fn test_server_without_entities_has_no_ip() {
        let server: Server = serde_json::from_str(r#"{"id": "srv", "properties": {}}"#).unwrap();
        assert!(server.volumes().is_empty());
        assert_eq!(server.primary_ip(), None);
    }

    #[test]
    fn test_volume_request_is_sparse() {
        let volume = Volume {
            id: None,
            properties: VolumeProperties {
                disk_type: Some("HDD".to_string()),
                size: Some(50.0),
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&volume).unwrap();
        assert_eq!(json["properties"]["type"], "HDD");
        assert!(json.get("id").is_none());
        assert!(json["properties"].get("sshKeys").is_none());
        assert!(json["properties"].get("imagePassword").is_none());
    }

    #[test]
    fn test_request_status_parsing() {
        let json = r#"{"id": "req", "metadata": {"status": "FAILED", "message": "quota exceeded"}}"#;
        let status: RequestStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.status(), REQUEST_FAILED);
        assert_eq!(status.metadata.message.as_deref(), Some("quota exceeded"));
    }
}
