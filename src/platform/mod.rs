//! Raw host counters and the collector trait that samples them.

mod collector;

pub use collector::{parse_proc_stat, HostStatsCollector};

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuLoad {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Cumulative CPU time in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub user: u64,
    pub sys: u64,
    pub wait: u64,
    pub total: u64,
}

/// Memory or swap usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemStats {
    pub used: u64,
    pub total: u64,
}

/// Filesystem usage in blocks and inodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskStats {
    pub used: u64,
    pub total: u64,
    pub inode_used: u64,
    pub inode_total: u64,
}

/// One sample of every counter the vitals are built from.
///
/// `None` means the counter could not be read on this host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostStats {
    pub cpu_load: Option<CpuLoad>,
    pub cpu_stats: Option<CpuStats>,
    pub mem_stats: Option<MemStats>,
    pub swap_stats: Option<MemStats>,
    /// Keyed by mount point.
    pub disk_stats: HashMap<String, DiskStats>,
}

/// Source of raw host counters.
///
/// Sampling may touch the filesystem, so callers on the async runtime should
/// run it on a blocking thread.
pub trait StatsCollector: Send + Sync {
    fn collect_stats(&self) -> HostStats;
}
