//! Raw host counters to heartbeat vitals.
//!
//! Pure formatting, no state. Missing samples, unconfigured disk roles and
//! zero totals all resolve to empty strings ("no data"), never to errors.

use crate::config::{DiskRole, Settings};
use crate::mbus::heartbeat::{self, Disks, Vitals};
use crate::platform::{CpuLoad, CpuStats, DiskStats, HostStats, MemStats};

/// Build the vitals snapshot for one heartbeat.
pub fn build_vitals(stats: &HostStats, settings: &Settings) -> Vitals {
    let disk_for = |role| {
        settings
            .mount_point(role)
            .and_then(|mount| stats.disk_stats.get(mount))
            .map(format_disk)
            .unwrap_or_default()
    };

    Vitals {
        cpu_load: stats.cpu_load.map(format_load).unwrap_or_default(),
        cpu: stats.cpu_stats.map(format_cpu).unwrap_or_default(),
        used_mem: stats.mem_stats.map(format_mem).unwrap_or_default(),
        used_swap: stats.swap_stats.map(format_mem).unwrap_or_default(),
        disks: Disks {
            system: disk_for(DiskRole::System),
            ephemeral: disk_for(DiskRole::Ephemeral),
            persistent: disk_for(DiskRole::Persistent),
        },
    }
}

pub fn format_load(load: CpuLoad) -> Vec<String> {
    [load.one, load.five, load.fifteen]
        .iter()
        .map(|l| format!("{l:.2}"))
        .collect()
}

pub fn format_cpu(stats: CpuStats) -> heartbeat::CpuStats {
    heartbeat::CpuStats {
        user: percent(stats.user, stats.total, 1),
        sys: percent(stats.sys, stats.total, 1),
        wait: percent(stats.wait, stats.total, 1),
    }
}

pub fn format_mem(stats: MemStats) -> heartbeat::MemStats {
    heartbeat::MemStats {
        percent: percent(stats.used, stats.total, 0),
        kb: (stats.used / 1024).to_string(),
    }
}

pub fn format_disk(stats: &DiskStats) -> heartbeat::DiskStats {
    heartbeat::DiskStats {
        percent: percent(stats.used, stats.total, 0),
        inode_percent: percent(stats.inode_used, stats.inode_total, 0),
    }
}

/// `part / total * 100` with `decimals` fractional digits, or empty on a
/// zero total.
fn percent(part: u64, total: u64, decimals: usize) -> String {
    if total == 0 {
        return String::new();
    }
    let value = part as f64 * 100.0 / total as f64;
    format!("{value:.decimals$}")
}
