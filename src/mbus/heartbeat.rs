//! Heartbeat wire types.
//!
//! Every heartbeat is a full snapshot. Percent and quantity fields are
//! pre-formatted strings; an empty string means "no data" and is left out
//! of the serialized output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub job: String,
    pub index: u32,
    pub job_state: JobState,
    pub vitals: Vitals,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    /// 1, 5 and 15 minute load averages.
    #[serde(rename = "load", default, skip_serializing_if = "Vec::is_empty")]
    pub cpu_load: Vec<String>,
    pub cpu: CpuStats,
    #[serde(rename = "mem")]
    pub used_mem: MemStats,
    #[serde(rename = "swap")]
    pub used_swap: MemStats,
    #[serde(rename = "disk")]
    pub disks: Disks,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sys: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub wait: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemStats {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub percent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kb: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStats {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub percent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub inode_percent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disks {
    pub system: DiskStats,
    pub ephemeral: DiskStats,
    pub persistent: DiskStats,
}
