//! Host counter sampling backed by `sysinfo`, `statvfs` and `/proc/stat`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sysinfo::{Disks, System};
use tracing::{debug, warn};

use super::{CpuLoad, CpuStats, DiskStats, HostStats, MemStats, StatsCollector};

const PROC_STAT: &str = "/proc/stat";

/// Samples the live host.
///
/// Disk space comes from `sysinfo`; inode counters from `statvfs` on each
/// mount point.
#[derive(Debug, Clone)]
pub struct HostStatsCollector {
    proc_stat: PathBuf,
}

impl Default for HostStatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStatsCollector {
    pub fn new() -> Self {
        Self {
            proc_stat: PathBuf::from(PROC_STAT),
        }
    }

    fn cpu_stats(&self) -> Option<CpuStats> {
        match std::fs::read_to_string(&self.proc_stat) {
            Ok(content) => {
                let stats = parse_proc_stat(&content);
                if stats.is_none() {
                    warn!(path = %self.proc_stat.display(), "Unrecognized cpu line");
                }
                stats
            }
            Err(e) => {
                debug!(path = %self.proc_stat.display(), error = %e, "Cannot read cpu ticks");
                None
            }
        }
    }
}

impl StatsCollector for HostStatsCollector {
    fn collect_stats(&self) -> HostStats {
        let load = System::load_average();

        let mut sys = System::new();
        sys.refresh_memory();

        let disks = Disks::new_with_refreshed_list();
        let mut disk_stats = HashMap::new();
        for disk in disks.list() {
            let mount = disk.mount_point().to_string_lossy().into_owned();
            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            // First entry wins when a mount point is listed twice
            disk_stats.entry(mount).or_insert_with(|| {
                let (inode_used, inode_total) =
                    inode_usage(disk.mount_point()).unwrap_or_default();
                DiskStats {
                    used,
                    total,
                    inode_used,
                    inode_total,
                }
            });
        }

        HostStats {
            cpu_load: Some(CpuLoad {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            }),
            cpu_stats: self.cpu_stats(),
            mem_stats: Some(MemStats {
                used: sys.used_memory(),
                total: sys.total_memory(),
            }),
            swap_stats: Some(MemStats {
                used: sys.used_swap(),
                total: sys.total_swap(),
            }),
            disk_stats,
        }
    }
}

/// `(used, total)` inodes of the filesystem mounted at `mount`.
#[cfg(unix)]
#[allow(clippy::useless_conversion)]
fn inode_usage(mount: &Path) -> Option<(u64, u64)> {
    match nix::sys::statvfs::statvfs(mount) {
        Ok(stat) => Some(inode_counts(
            u64::from(stat.files()),
            u64::from(stat.files_free()),
        )),
        Err(e) => {
            debug!(mount = %mount.display(), error = %e, "Cannot read inode counters");
            None
        }
    }
}

#[cfg(not(unix))]
fn inode_usage(_mount: &Path) -> Option<(u64, u64)> {
    None
}

/// `(used, total)` from the `f_files` and `f_ffree` counters of `statvfs`.
pub const fn inode_counts(files: u64, files_free: u64) -> (u64, u64) {
    (files.saturating_sub(files_free), files)
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Columns: user nice system idle iowait irq softirq steal [guest guest_nice].
/// Guest time is already counted in user, so the total sums the first eight.
pub fn parse_proc_stat(content: &str) -> Option<CpuStats> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let ticks: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if ticks.len() < 5 {
        return None;
    }

    Some(CpuStats {
        user: ticks[0],
        sys: ticks[2],
        wait: ticks[4],
        total: ticks.iter().take(8).sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aggregate_cpu_line() {
        let content = "cpu  100 5 50 800 20 3 2 0 7 0\n\
                       cpu0 50 2 25 400 10 1 1 0 3 0\n\
                       intr 12345\n";
        let stats = parse_proc_stat(content).unwrap();
        assert_eq!(
            stats,
            CpuStats {
                user: 100,
                sys: 50,
                wait: 20,
                total: 980,
            }
        );
    }

    #[test]
    fn inode_counts_from_statvfs_fields() {
        assert_eq!(inode_counts(1000, 700), (300, 1000));
        assert_eq!(inode_counts(0, 0), (0, 0));
        // Some filesystems report more free slots than total
        assert_eq!(inode_counts(10, 12), (0, 10));
    }

    #[cfg(unix)]
    #[test]
    fn root_filesystem_reports_inodes() {
        let (used, total) = inode_usage(Path::new("/")).unwrap();
        assert!(used <= total);
    }

    #[test]
    fn short_kernel_line_still_parses() {
        let stats = parse_proc_stat("cpu 10 0 5 80 5\n").unwrap();
        assert_eq!(stats.total, 100);
        assert_eq!(stats.wait, 5);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_proc_stat("").is_none());
        assert!(parse_proc_stat("cpu a b c d e\n").is_none());
        assert!(parse_proc_stat("cpu 1 2\n").is_none());
    }

    #[test]
    fn unreadable_proc_stat_yields_no_cpu_data() {
        let collector = HostStatsCollector {
            proc_stat: PathBuf::from("/nonexistent/stat"),
        };
        assert!(collector.cpu_stats().is_none());
    }

    #[test]
    fn reads_cpu_ticks_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stat");
        std::fs::write(&path, "cpu  55 0 44 890 11 0 0 0 0 0\n").unwrap();

        let collector = HostStatsCollector { proc_stat: path };
        let stats = collector.cpu_stats().unwrap();
        assert_eq!(stats.user, 55);
        assert_eq!(stats.sys, 44);
        assert_eq!(stats.wait, 11);
        assert_eq!(stats.total, 1000);
    }
}
