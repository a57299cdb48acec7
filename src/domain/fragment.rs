// Normalized per-source fragments
use super::chart::NodeChart;
use super::source::SourceId;
use serde::Serialize;

/// The output of one successful poll. Replaces the previous fragment of the
/// same source as a whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "data", rename_all = "snake_case")]
pub enum Fragment {
    System(SystemFragment),
    Health(HealthFragment),
    NodeMetrics(NodeChart),
    Vms(VmFragment),
    Storage(StorageFragment),
    StorageDetail(StorageDetailFragment),
    Network(NetworkFragment),
}

impl Fragment {
    pub fn source(&self) -> SourceId {
        match self {
            Self::System(_) => SourceId::System,
            Self::Health(_) => SourceId::Health,
            Self::NodeMetrics(_) => SourceId::NodeMetrics,
            Self::Vms(_) => SourceId::Vms,
            Self::Storage(_) => SourceId::Storage,
            Self::StorageDetail(_) => SourceId::StorageDetail,
            Self::Network(_) => SourceId::Network,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TemperatureStatus {
    #[serde(rename = "N/A")]
    Unavailable,
    Normal,
    Warm,
    Hot,
}

impl TemperatureStatus {
    pub fn classify(celsius: f64) -> Self {
        if celsius <= 0.0 {
            Self::Unavailable
        } else if celsius < 60.0 {
            Self::Normal
        } else if celsius < 75.0 {
            Self::Warm
        } else {
            Self::Hot
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadStatus {
    Normal,
    Moderate,
    High,
}

impl LoadStatus {
    pub fn classify(load: f64, cores: u32) -> Self {
        let cores = f64::from(cores.max(1));
        if load < cores {
            Self::Normal
        } else if load < cores * 1.5 {
            Self::Moderate
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemFragment {
    pub hostname: String,
    pub node_id: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub memory_total_gb: f64,
    pub memory_used_gb: f64,
    pub temperature: f64,
    pub temperature_status: TemperatureStatus,
    pub uptime: String,
    pub load_average: [f64; 3],
    pub load_status: LoadStatus,
    pub cpu_cores: Option<u32>,
    pub cpu_threads: Option<u32>,
    pub kernel_version: String,
    pub proxmox_version: String,
    pub available_updates: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn from_backend(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            Some("CRITICAL") => Self::Critical,
            Some("WARNING") => Self::Warning,
            _ => Self::Healthy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthFragment {
    pub status: HealthStatus,
    pub hostname: String,
    pub node_id: String,
    pub uptime: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestKind {
    Qemu,
    Lxc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmSummary {
    pub vmid: u64,
    pub name: String,
    pub status: String,
    pub kind: GuestKind,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_gb: f64,
    pub max_memory_gb: f64,
    pub disk_gb: f64,
    pub max_disk_gb: f64,
    pub uptime: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct VmStats {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub lxc: usize,
    pub qemu: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmFragment {
    pub guests: Vec<VmSummary>,
    pub stats: VmStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskUsage {
    pub name: String,
    pub mountpoint: String,
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoragePool {
    pub name: String,
    pub kind: String,
    pub status: String,
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub percent: f64,
}

/// Sum over the pools that hold guest disks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct PoolAggregate {
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "pools", rename_all = "lowercase")]
pub enum PoolList {
    Available(Vec<StoragePool>),
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageFragment {
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub disk_count: u64,
    pub disks: Vec<DiskUsage>,
    pub pools: PoolList,
    pub local_pool: Option<StoragePool>,
    pub guest_pools: PoolAggregate,
}

/// Health of a disk or ZFS pool as reported by SMART / `zpool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskHealth {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl DiskHealth {
    pub fn classify(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("healthy" | "passed" | "online") => Self::Healthy,
            Some("warning") => Self::Warning,
            Some("critical" | "failed" | "degraded") => Self::Critical,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskDetail {
    pub name: String,
    pub model: String,
    pub serial: String,
    pub size: String,
    pub health: DiskHealth,
    pub smart_status: String,
    /// Celsius; 0 when the drive reports none.
    pub temperature: f64,
    pub power_on_hours: u64,
    pub power_cycles: u64,
    pub reallocated_sectors: u64,
    pub pending_sectors: u64,
    pub crc_errors: u64,
    /// Percent of rated endurance consumed, when the drive exposes one.
    pub wear_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZfsPool {
    pub name: String,
    pub size: String,
    pub allocated: String,
    pub free: String,
    pub health: DiskHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageDetailFragment {
    pub disk_count: u64,
    pub healthy_disks: u64,
    pub warning_disks: u64,
    pub critical_disks: u64,
    pub disks: Vec<DiskDetail>,
    pub zfs_pools: Vec<ZfsPool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct TrafficCounters {
    pub bytes_sent: f64,
    pub bytes_recv: f64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkFragment {
    pub interface_count: usize,
    pub interfaces_up: usize,
    pub physical_active: u64,
    pub physical_total: u64,
    pub bridge_active: u64,
    pub bridge_total: u64,
    pub traffic: TrafficCounters,
}
