//! Resource counter snapshots and the metrics derived from a pair of them.

use crate::lifecycle::Container;
use crate::runtime::ContainerRuntime;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

pub const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Raw counters of one container at one instant.
///
/// The CPU fields come in pairs: the runtime reports the current totals together with
/// the totals of its previous sampling window, so a single snapshot already describes
/// a CPU rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounters {
    pub cpu_total_usage: u64,
    pub prior_cpu_total_usage: u64,
    pub system_cpu_usage: u64,
    pub prior_system_cpu_usage: u64,
    pub online_cpu_count: u32,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub block_bytes_read: u64,
    pub block_bytes_written: u64,
    pub network_bytes_in: u64,
    pub network_bytes_out: u64,
}

impl RawCounters {
    pub fn zeroed() -> Self {
        Self::default()
    }

    pub fn is_zeroed(&self) -> bool {
        *self == Self::default()
    }
}

/// Metrics for one bracket of two snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceMetrics {
    pub cpu_percent: f64,
    pub memory_usage_mb: f64,
    pub memory_percent: f64,
    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
    pub network_in_mb: f64,
    pub network_out_mb: f64,
    /// Set when a cumulative counter went backwards and its delta was clamped to zero.
    pub counter_reset: bool,
}

/// Derive metrics from the snapshots taken before (`prev`) and after (`curr`) a query.
pub fn diff(prev: &RawCounters, curr: &RawCounters) -> ResourceMetrics {
    let mut counter_reset = false;
    let mut delta = |name: &str, before: u64, after: u64| match after.checked_sub(before) {
        Some(bytes) => bytes as f64 / BYTES_PER_MIB,
        None => {
            warn!(
                counter = name,
                before, after, "Counter decreased between snapshots, reporting zero"
            );
            counter_reset = true;
            0.0
        }
    };

    let disk_read_mb = delta("block_read", prev.block_bytes_read, curr.block_bytes_read);
    let disk_write_mb = delta(
        "block_write",
        prev.block_bytes_written,
        curr.block_bytes_written,
    );
    let network_in_mb = delta("network_in", prev.network_bytes_in, curr.network_bytes_in);
    let network_out_mb = delta("network_out", prev.network_bytes_out, curr.network_bytes_out);

    ResourceMetrics {
        cpu_percent: cpu_percent(prev, curr),
        memory_usage_mb: curr.memory_usage_bytes as f64 / BYTES_PER_MIB,
        memory_percent: memory_percent(curr),
        disk_read_mb,
        disk_write_mb,
        network_in_mb,
        network_out_mb,
        counter_reset,
    }
}

fn cpu_percent(prev: &RawCounters, curr: &RawCounters) -> f64 {
    // No CPU time consumed inside the bracket.
    if curr.cpu_total_usage <= prev.cpu_total_usage {
        return 0.0;
    }
    let cpu_delta = curr.cpu_total_usage.saturating_sub(curr.prior_cpu_total_usage);
    let system_delta = curr
        .system_cpu_usage
        .saturating_sub(curr.prior_system_cpu_usage);
    if cpu_delta == 0 || system_delta == 0 {
        return 0.0;
    }
    let online = f64::from(curr.online_cpu_count);
    let ceiling = online * 100.0;
    (cpu_delta as f64 / system_delta as f64 * ceiling).clamp(0.0, ceiling)
}

fn memory_percent(curr: &RawCounters) -> f64 {
    if curr.memory_limit_bytes == 0 {
        return 0.0;
    }
    (curr.memory_usage_bytes as f64 / curr.memory_limit_bytes as f64 * 100.0).clamp(0.0, 100.0)
}

/// Snapshot a container, degrading to zeroed counters when collection fails.
pub async fn snapshot(runtime: &dyn ContainerRuntime, container: &Container) -> RawCounters {
    let Some(handle) = container.handle() else {
        warn!(
            "No container handle for {}, using zeroed counters",
            container.name()
        );
        return RawCounters::zeroed();
    };
    match runtime.stats(handle).await {
        Ok(counters) => counters,
        Err(e) => {
            warn!(
                "Failed to collect stats for {}: {}; using zeroed counters",
                container.name(),
                e
            );
            RawCounters::zeroed()
        }
    }
}

/// Body of `GET /containers/{id}/stats?stream=false`, reduced to the fields we read.
#[derive(Debug, Default, Deserialize)]
pub struct DockerStats {
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
    #[serde(default)]
    pub blkio_stats: BlkioStats,
    #[serde(default)]
    pub networks: Option<HashMap<String, NetworkStats>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: Option<u64>,
    #[serde(default)]
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
    #[serde(default)]
    pub percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlkioStats {
    #[serde(default)]
    pub io_service_bytes_recursive: Option<Vec<BlkioEntry>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlkioEntry {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

impl From<DockerStats> for RawCounters {
    fn from(stats: DockerStats) -> Self {
        let online_cpu_count = stats
            .cpu_stats
            .online_cpus
            .filter(|n| *n > 0)
            .or_else(|| {
                stats
                    .cpu_stats
                    .cpu_usage
                    .percpu_usage
                    .as_ref()
                    .map(|per_cpu| per_cpu.len() as u32)
                    .filter(|n| *n > 0)
            })
            .unwrap_or_else(|| num_cpus::get() as u32);

        let blkio = stats
            .blkio_stats
            .io_service_bytes_recursive
            .unwrap_or_default();
        let block_total = |op: &str| -> u64 {
            blkio
                .iter()
                .filter(|entry| entry.op.eq_ignore_ascii_case(op))
                .map(|entry| entry.value)
                .sum()
        };

        let networks = stats.networks.unwrap_or_default();

        RawCounters {
            cpu_total_usage: stats.cpu_stats.cpu_usage.total_usage,
            prior_cpu_total_usage: stats.precpu_stats.cpu_usage.total_usage,
            system_cpu_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
            prior_system_cpu_usage: stats.precpu_stats.system_cpu_usage.unwrap_or(0),
            online_cpu_count,
            memory_usage_bytes: stats.memory_stats.usage.unwrap_or(0),
            memory_limit_bytes: stats.memory_stats.limit.unwrap_or(0),
            block_bytes_read: block_total("read"),
            block_bytes_written: block_total("write"),
            network_bytes_in: networks.values().map(|n| n.rx_bytes).sum(),
            network_bytes_out: networks.values().map(|n| n.tx_bytes).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawCounters {
        RawCounters {
            cpu_total_usage: 4_000_000,
            prior_cpu_total_usage: 3_000_000,
            system_cpu_usage: 20_000_000,
            prior_system_cpu_usage: 10_000_000,
            online_cpu_count: 4,
            memory_usage_bytes: 256 * 1_048_576,
            memory_limit_bytes: 1024 * 1_048_576,
            block_bytes_read: 10 * 1_048_576,
            block_bytes_written: 5 * 1_048_576,
            network_bytes_in: 1_048_576,
            network_bytes_out: 2 * 1_048_576,
        }
    }

    #[test]
    fn test_diff_of_identical_snapshots_is_zero() {
        let s = sample();
        let m = diff(&s, &s);
        assert_eq!(m.cpu_percent, 0.0);
        assert_eq!(m.disk_read_mb, 0.0);
        assert_eq!(m.disk_write_mb, 0.0);
        assert_eq!(m.network_in_mb, 0.0);
        assert_eq!(m.network_out_mb, 0.0);
        assert!(!m.counter_reset);
    }

    #[test]
    fn test_diff_uses_windowed_cpu_fields_of_curr() {
        let prev = sample();
        let mut curr = sample();
        curr.cpu_total_usage = 5_000_000;
        curr.prior_cpu_total_usage = 4_000_000;
        curr.system_cpu_usage = 30_000_000;
        curr.prior_system_cpu_usage = 20_000_000;

        let m = diff(&prev, &curr);
        // 1e6 / 1e7 * 4 cores * 100
        assert!((m.cpu_percent - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_diff_deltas_in_mib() {
        let prev = sample();
        let mut curr = sample();
        curr.block_bytes_read += 3 * 1_048_576;
        curr.block_bytes_written += 1_048_576 / 2;
        curr.network_bytes_in += 1_048_576;
        curr.network_bytes_out += 4 * 1_048_576;

        let m = diff(&prev, &curr);
        assert_eq!(m.disk_read_mb, 3.0);
        assert_eq!(m.disk_write_mb, 0.5);
        assert_eq!(m.network_in_mb, 1.0);
        assert_eq!(m.network_out_mb, 4.0);
        assert_eq!(m.memory_usage_mb, 256.0);
        assert_eq!(m.memory_percent, 25.0);
    }

    #[test]
    fn test_counter_reset_is_clamped_and_flagged() {
        let prev = sample();
        let mut curr = sample();
        curr.block_bytes_read = 0;
        curr.network_bytes_out = 0;

        let m = diff(&prev, &curr);
        assert_eq!(m.disk_read_mb, 0.0);
        assert_eq!(m.network_out_mb, 0.0);
        assert!(m.counter_reset);
    }

    #[test]
    fn test_percentages_stay_in_bounds() {
        let prev = RawCounters::zeroed();
        let curr = RawCounters {
            cpu_total_usage: 50_000_000,
            prior_cpu_total_usage: 0,
            system_cpu_usage: 10_000_000,
            prior_system_cpu_usage: 0,
            online_cpu_count: 2,
            memory_usage_bytes: 4096,
            memory_limit_bytes: 1024,
            ..RawCounters::zeroed()
        };
        let m = diff(&prev, &curr);
        assert_eq!(m.cpu_percent, 200.0);
        assert_eq!(m.memory_percent, 100.0);
    }

    #[test]
    fn test_zero_limits_and_cpus_yield_zero() {
        let prev = RawCounters::zeroed();
        let curr = RawCounters {
            cpu_total_usage: 10,
            system_cpu_usage: 100,
            memory_usage_bytes: 4096,
            ..RawCounters::zeroed()
        };
        let m = diff(&prev, &curr);
        assert_eq!(m.cpu_percent, 0.0);
        assert_eq!(m.memory_percent, 0.0);
    }

    #[test]
    fn test_docker_stats_conversion() {
        let json = r#"{
            "read": "2024-01-01T00:00:00Z",
            "cpu_stats": {
                "cpu_usage": {"total_usage": 200, "percpu_usage": [100, 100]},
                "system_cpu_usage": 2000
            },
            "precpu_stats": {
                "cpu_usage": {"total_usage": 100},
                "system_cpu_usage": 1000,
                "online_cpus": 2
            },
            "memory_stats": {"usage": 1048576, "limit": 4194304},
            "blkio_stats": {
                "io_service_bytes_recursive": [
                    {"major": 8, "minor": 0, "op": "Read", "value": 100},
                    {"major": 8, "minor": 0, "op": "Write", "value": 50},
                    {"major": 8, "minor": 16, "op": "read", "value": 25},
                    {"major": 8, "minor": 0, "op": "Total", "value": 175}
                ]
            },
            "networks": {
                "eth0": {"rx_bytes": 10, "tx_bytes": 20},
                "eth1": {"rx_bytes": 1, "tx_bytes": 2}
            }
        }"#;
        let stats: DockerStats = serde_json::from_str(json).unwrap();
        let counters = RawCounters::from(stats);

        assert_eq!(counters.cpu_total_usage, 200);
        assert_eq!(counters.prior_cpu_total_usage, 100);
        assert_eq!(counters.system_cpu_usage, 2000);
        assert_eq!(counters.prior_system_cpu_usage, 1000);
        assert_eq!(counters.online_cpu_count, 2);
        assert_eq!(counters.memory_usage_bytes, 1_048_576);
        assert_eq!(counters.block_bytes_read, 125);
        assert_eq!(counters.block_bytes_written, 50);
        assert_eq!(counters.network_bytes_in, 11);
        assert_eq!(counters.network_bytes_out, 22);
    }

    #[test]
    fn test_docker_stats_with_null_blkio_and_no_networks() {
        let json = r#"{
            "cpu_stats": {"cpu_usage": {"total_usage": 5}, "online_cpus": 8},
            "precpu_stats": {"cpu_usage": {"total_usage": 0}},
            "memory_stats": {},
            "blkio_stats": {"io_service_bytes_recursive": null}
        }"#;
        let stats: DockerStats = serde_json::from_str(json).unwrap();
        let counters = RawCounters::from(stats);
        assert_eq!(counters.online_cpu_count, 8);
        assert_eq!(counters.block_bytes_read, 0);
        assert_eq!(counters.network_bytes_in, 0);
        assert_eq!(counters.memory_limit_bytes, 0);
    }
}
