//! The artifact a successful build hands back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys used in [`Artifact::generated_data`]
pub const DATA_INSTANCE_ID: &str = "instance_id";
pub const DATA_DATACENTER_ID: &str = "datacenter_id";
pub const DATA_VOLUME_ID: &str = "volume_id";
pub const DATA_SERVER_IP: &str = "server_ip";

/// A named snapshot produced by a fully successful build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Configured snapshot name; this is the artifact identifier
    pub snapshot_name: String,

    /// Provider id of the snapshot, when known
    pub snapshot_id: Option<String>,

    /// Values discovered during the build (instance id, datacenter id, ...)
    pub generated_data: BTreeMap<String, String>,

    /// When the build finished
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(snapshot_name: impl Into<String>) -> Self {
        Self {
            snapshot_name: snapshot_name.into(),
            snapshot_id: None,
            generated_data: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_snapshot_id(mut self, id: Option<String>) -> Self {
        self.snapshot_id = id;
        self
    }

    /// Record a generated value; `None` values are skipped
    pub fn with_data(mut self, key: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.generated_data.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Identifier of the produced image
    pub fn id(&self) -> &str {
        &self.snapshot_name
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.snapshot_id {
            Some(id) => write!(f, "snapshot '{}' ({})", self.snapshot_name, id),
            None => write!(f, "snapshot '{}'", self.snapshot_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_generated_data() {
        let artifact = Artifact::new("golden-ubuntu")
            .with_data(DATA_INSTANCE_ID, Some("srv-1"))
            .with_data(DATA_DATACENTER_ID, Some("dc-1"))
            .with_data(DATA_SERVER_IP, None);

        assert_eq!(artifact.id(), "golden-ubuntu");
        assert_eq!(artifact.generated_data.len(), 2);
        assert_eq!(artifact.generated_data[DATA_INSTANCE_ID], "srv-1");
    }

    #[test]
    fn test_artifact_display() {
        let artifact = Artifact::new("golden").with_snapshot_id(Some("snap-9".to_string()));
        assert_eq!(artifact.to_string(), "snapshot 'golden' (snap-9)");
    }
}
