use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Where a participant's terminal listens, and whether it may be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRoute {
    pub topic: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl DeviceRoute {
    pub fn enabled(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            enabled: true,
        }
    }

    pub fn disabled(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            enabled: false,
        }
    }
}

/// Maps a participant (cashier, user account) to its terminal route.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// `Ok(None)` when the participant has no usable mapping.
    async fn resolve(&self, participant: &str) -> Result<Option<DeviceRoute>>;
}

pub type SharedDirectory = Arc<dyn DeviceDirectory>;

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    devices: Vec<DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    user: String,
    topic: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

/// Directory held in memory, optionally seeded from a YAML file:
///
/// ```yaml
/// devices:
///   - user: cashier-1
///     topic: terminals/t-100
///     enabled: true
/// ```
#[derive(Default)]
pub struct StaticDirectory {
    routes: DashMap<String, DeviceRoute>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, participant: impl Into<String>, route: DeviceRoute) -> Self {
        self.insert(participant, route);
        self
    }

    pub fn insert(&self, participant: impl Into<String>, route: DeviceRoute) {
        self.routes.insert(participant.into(), route);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: DirectoryFile =
            serde_yaml_bw::from_str(raw).context("parse device directory yaml")?;
        let directory = Self::new();
        for entry in file.devices {
            let route = DeviceRoute {
                topic: entry.topic,
                enabled: entry.enabled,
            };
            directory.insert(entry.user, route);
        }
        Ok(directory)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read device directory {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }
}

#[async_trait]
impl DeviceDirectory for StaticDirectory {
    async fn resolve(&self, participant: &str) -> Result<Option<DeviceRoute>> {
        Ok(self
            .routes
            .get(participant)
            .map(|entry| entry.value().clone())
            .filter(|route| !route.topic.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn resolves_known_participants_only() {
        let directory = StaticDirectory::new()
            .with_route("cashier-1", DeviceRoute::enabled("terminals/t-100"))
            .with_route("cashier-2", DeviceRoute::disabled("terminals/t-200"))
            .with_route("cashier-3", DeviceRoute::enabled("  "));

        assert_eq!(
            directory.resolve("cashier-1").await.unwrap(),
            Some(DeviceRoute::enabled("terminals/t-100"))
        );
        assert!(!directory.resolve("cashier-2").await.unwrap().unwrap().enabled);
        assert!(directory.resolve("cashier-3").await.unwrap().is_none());
        assert!(directory.resolve("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn loads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "devices:\n  - user: cashier-1\n    topic: terminals/t-100\n  - user: cashier-2\n    topic: terminals/t-200\n    enabled: false"
        )
        .unwrap();

        let directory = StaticDirectory::from_yaml_file(file.path()).unwrap();
        assert!(!directory.is_empty());
        assert_eq!(directory.len(), 2);
        assert!(directory.resolve("cashier-1").await.unwrap().unwrap().enabled);
        assert!(!directory.resolve("cashier-2").await.unwrap().unwrap().enabled);
    }

    #[test]
    fn empty_device_list_loads_as_empty_directory() {
        let directory = StaticDirectory::from_yaml_str("devices: []").unwrap();
        assert!(directory.is_empty());
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(StaticDirectory::from_yaml_str("devices: [user: ").is_err());
    }
}
