//! Agent settings loaded from host-provided JSON.
//!
//! The host bootstrap passes settings via the `NODE_AGENT_SETTINGS`
//! environment variable, or the operator points `--settings` at a JSON file.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable carrying the settings JSON.
pub const SETTINGS_ENV: &str = "NODE_AGENT_SETTINGS";

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Identifier the orchestrator knows this agent by.
    #[serde(default)]
    pub agent_id: String,

    /// Block devices backing each disk role.
    #[serde(default)]
    pub disks: DiskSettings,

    /// Where each disk role is mounted on the host.
    #[serde(default)]
    pub mounts: MountSettings,

    /// Heartbeat emission settings.
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
}

/// Device paths per disk role. An unset role has no backing device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskSettings {
    #[serde(default)]
    pub system: Option<String>,

    #[serde(default)]
    pub ephemeral: Option<String>,

    /// Persistent disks keyed by volume id.
    #[serde(default)]
    pub persistent: HashMap<String, String>,
}

/// Mount points per disk role.
#[derive(Debug, Clone, Deserialize)]
pub struct MountSettings {
    #[serde(default = "default_system_mount")]
    pub system: String,

    #[serde(default = "default_ephemeral_mount")]
    pub ephemeral: String,

    #[serde(default = "default_persistent_mount")]
    pub persistent: String,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            system: default_system_mount(),
            ephemeral: default_ephemeral_mount(),
            persistent: default_persistent_mount(),
        }
    }
}

/// Heartbeat configuration (as read from JSON).
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSettings {
    /// Seconds between heartbeats.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_seconds: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_heartbeat_interval(),
        }
    }
}

/// The three disk roles reported in vitals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiskRole {
    System,
    Ephemeral,
    Persistent,
}

impl DiskRole {
    pub const ALL: [Self; 3] = [Self::System, Self::Ephemeral, Self::Persistent];
}

impl fmt::Display for DiskRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Ephemeral => write!(f, "ephemeral"),
            Self::Persistent => write!(f, "persistent"),
        }
    }
}

fn default_system_mount() -> String {
    "/".into()
}

fn default_ephemeral_mount() -> String {
    "/var/vcap/data".into()
}

fn default_persistent_mount() -> String {
    "/var/vcap/store".into()
}

const fn default_heartbeat_interval() -> u64 {
    60
}

impl Settings {
    /// Load settings from the `NODE_AGENT_SETTINGS` environment variable.
    pub fn from_env() -> Result<Self> {
        let json = std::env::var(SETTINGS_ENV)
            .with_context(|| format!("{SETTINGS_ENV} not set and no --settings file given"))?;

        Self::from_json(&json).with_context(|| format!("Failed to parse {SETTINGS_ENV}"))
    }

    /// Load settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        Self::from_json(&json)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Parse settings from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        anyhow::ensure!(
            settings.heartbeat.interval_seconds > 0,
            "heartbeat.interval_seconds must be at least 1"
        );
        Ok(settings)
    }

    /// Whether a backing device is configured for `role`.
    pub fn has_device(&self, role: DiskRole) -> bool {
        match role {
            DiskRole::System => is_set(self.disks.system.as_deref()),
            DiskRole::Ephemeral => is_set(self.disks.ephemeral.as_deref()),
            DiskRole::Persistent => self.disks.persistent.values().any(|d| !d.is_empty()),
        }
    }

    /// Mount point to sample for `role`, or `None` when no device backs it.
    pub fn mount_point(&self, role: DiskRole) -> Option<&str> {
        if !self.has_device(role) {
            return None;
        }
        let mount = match role {
            DiskRole::System => &self.mounts.system,
            DiskRole::Ephemeral => &self.mounts.ephemeral,
            DiskRole::Persistent => &self.mounts.persistent,
        };
        Some(mount.as_str())
    }

    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat.interval_seconds)
    }
}

fn is_set(device: Option<&str>) -> bool {
    device.is_some_and(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_settings() {
        let json = r#"{
            "agent_id": "agent-123",
            "disks": {
                "system": "/dev/sda1",
                "ephemeral": "/dev/sdb",
                "persistent": {"vol-xxxx": "/dev/sdf"}
            },
            "mounts": {"ephemeral": "/data"},
            "heartbeat": {"interval_seconds": 10}
        }"#;

        let settings = Settings::from_json(json).unwrap();

        assert_eq!(settings.agent_id, "agent-123");
        assert_eq!(settings.disks.system.as_deref(), Some("/dev/sda1"));
        assert_eq!(settings.disks.persistent["vol-xxxx"], "/dev/sdf");
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(10));

        // Unset mounts keep their defaults
        assert_eq!(settings.mounts.system, "/");
        assert_eq!(settings.mounts.ephemeral, "/data");
        assert_eq!(settings.mounts.persistent, "/var/vcap/store");
    }

    #[test]
    fn defaults_from_empty_object() {
        let settings = Settings::from_json("{}").unwrap();
        assert!(settings.agent_id.is_empty());
        assert_eq!(settings.heartbeat_interval(), Duration::from_secs(60));
        for role in DiskRole::ALL {
            assert!(!settings.has_device(role), "{role} should be unconfigured");
            assert!(settings.mount_point(role).is_none());
        }
    }

    #[test]
    fn mount_point_only_for_configured_roles() {
        let json = r#"{"disks": {"system": "/dev/sda1", "ephemeral": ""}}"#;
        let settings = Settings::from_json(json).unwrap();

        assert_eq!(settings.mount_point(DiskRole::System), Some("/"));
        // Empty device string counts as unconfigured
        assert_eq!(settings.mount_point(DiskRole::Ephemeral), None);
        assert_eq!(settings.mount_point(DiskRole::Persistent), None);
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"agent_id": "from-file"}"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.agent_id, "from-file");
    }

    #[test]
    fn from_file_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read settings file"));
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(Settings::from_json("{not json").is_err());
    }

    #[test]
    fn zero_heartbeat_interval_is_rejected() {
        let err = Settings::from_json(r#"{"heartbeat": {"interval_seconds": 0}}"#).unwrap_err();
        assert!(err.to_string().contains("interval_seconds must be at least 1"));
    }

    #[test]
    fn disk_role_names() {
        let names: Vec<String> = DiskRole::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["system", "ephemeral", "persistent"]);
    }
}
