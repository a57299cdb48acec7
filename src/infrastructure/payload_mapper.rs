// Mapper from raw backend payloads to normalized fragments
//
// Every function here is pure and total: missing or mistyped fields resolve
// to their neutral default instead of failing the fragment.
use crate::domain::fragment::{
    DiskDetail, DiskHealth, DiskUsage, GuestKind, HealthFragment, HealthStatus, LoadStatus,
    NetworkFragment, PoolAggregate, PoolList, StorageDetailFragment, StorageFragment,
    StoragePool, SystemFragment, TemperatureStatus, TrafficCounters, VmFragment, VmStats,
    VmSummary, ZfsPool,
};
use crate::domain::payload::Fields;
use crate::domain::units::{bytes_to_gb, fraction_to_percent, ratio_percent, round2};
use serde_json::Value;

const NOT_AVAILABLE: &str = "N/A";
const UNKNOWN: &str = "Unknown";
const DEFAULT_CORE_COUNT: u32 = 8;
const GUEST_POOL_TYPES: [&str; 5] = ["lvm", "lvmthin", "zfspool", "btrfs", "dir"];

pub fn system_fragment(raw: &Value) -> SystemFragment {
    let fields = Fields::new(raw);
    let load = fields.array("load_average");
    let load_at = |idx: usize| {
        load.get(idx)
            .and_then(|v| v.as_f64())
            .map(round2)
            .unwrap_or(0.0)
    };
    let load_average = [load_at(0), load_at(1), load_at(2)];
    let cpu_cores = fields.number("cpu_cores").filter(|n| *n > 0.0).map(|n| n as u32);
    let temperature = round2(fields.number_or_zero("temperature"));

    SystemFragment {
        hostname: fields.text_or("hostname", NOT_AVAILABLE),
        node_id: fields.text_or("node_id", NOT_AVAILABLE),
        cpu_usage: round2(fields.number_or_zero("cpu_usage")),
        memory_usage: round2(fields.number_or_zero("memory_usage")),
        memory_total_gb: round2(fields.number_or_zero("memory_total")),
        memory_used_gb: round2(fields.number_or_zero("memory_used")),
        temperature,
        temperature_status: TemperatureStatus::classify(temperature),
        uptime: fields.text_or("uptime", NOT_AVAILABLE),
        load_average,
        load_status: LoadStatus::classify(load_average[0], cpu_cores.unwrap_or(DEFAULT_CORE_COUNT)),
        cpu_cores,
        cpu_threads: fields.number("cpu_threads").filter(|n| *n > 0.0).map(|n| n as u32),
        kernel_version: fields.text_or("kernel_version", NOT_AVAILABLE),
        proxmox_version: fields.text_or("proxmox_version", NOT_AVAILABLE),
        available_updates: fields.count("available_updates"),
    }
}

pub fn health_fragment(raw: &Value) -> HealthFragment {
    let fields = Fields::new(raw);
    HealthFragment {
        status: HealthStatus::from_backend(fields.nested("health").text("status")),
        hostname: fields.text_or("hostname", UNKNOWN),
        node_id: fields.text_or("node_id", UNKNOWN),
        uptime: fields.text_or("uptime", NOT_AVAILABLE),
    }
}

/// The guest list arrives either as a bare array or wrapped in `{"vms": [...]}`.
pub fn vm_fragment(raw: &Value) -> VmFragment {
    let entries: &[Value] = match raw {
        Value::Array(items) => items,
        other => Fields::new(other).array("vms"),
    };
    let guests: Vec<VmSummary> = entries.iter().map(vm_summary).collect();

    let stats = VmStats {
        total: guests.len(),
        running: guests.iter().filter(|g| g.status == "running").count(),
        stopped: guests.iter().filter(|g| g.status == "stopped").count(),
        lxc: guests.iter().filter(|g| g.kind == GuestKind::Lxc).count(),
        qemu: guests.iter().filter(|g| g.kind == GuestKind::Qemu).count(),
    };

    VmFragment { guests, stats }
}

fn vm_summary(raw: &Value) -> VmSummary {
    let fields = Fields::new(raw);
    let kind = match fields.text("type") {
        Some("lxc") => GuestKind::Lxc,
        _ => GuestKind::Qemu,
    };
    let mem = fields.number_or_zero("mem");
    let maxmem = fields.number_or_zero("maxmem");

    VmSummary {
        vmid: fields.count("vmid"),
        name: fields.text_or("name", NOT_AVAILABLE),
        status: fields.text_or("status", "unknown"),
        kind,
        cpu_percent: fraction_to_percent(fields.number_or_zero("cpu")),
        memory_percent: ratio_percent(mem, maxmem),
        memory_gb: bytes_to_gb(mem),
        max_memory_gb: bytes_to_gb(maxmem),
        disk_gb: bytes_to_gb(fields.number_or_zero("disk")),
        max_disk_gb: bytes_to_gb(fields.number_or_zero("maxdisk")),
        uptime: format_uptime(fields.count("uptime")),
    }
}

/// `0` -> "Stopped", otherwise the two most significant units.
pub fn format_uptime(seconds: u64) -> String {
    if seconds == 0 {
        return "Stopped".to_string();
    }
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// `pools` is `None` when the companion endpoint could not be fetched.
pub fn storage_fragment(summary: &Value, pools: Option<&Value>) -> StorageFragment {
    let fields = Fields::new(summary);
    let disks = fields
        .array("disks")
        .iter()
        .map(|raw| {
            let disk = Fields::new(raw);
            DiskUsage {
                name: disk.text_or("name", NOT_AVAILABLE),
                mountpoint: disk.text_or("mountpoint", ""),
                total: round2(disk.number_or_zero("total")),
                used: round2(disk.number_or_zero("used")),
                available: round2(disk.number_or_zero("available")),
                usage_percent: round2(disk.number_or_zero("usage_percent")),
            }
        })
        .collect::<Vec<_>>();
    let disk_count = fields
        .number("disk_count")
        .map(|_| fields.count("disk_count"))
        .unwrap_or(disks.len() as u64);

    let pools = match pools {
        Some(raw) => PoolList::Available(storage_pools(raw)),
        None => PoolList::Unavailable,
    };
    let (local_pool, guest_pools) = match &pools {
        PoolList::Available(list) => (
            list.iter().find(|p| p.name == "local").cloned(),
            guest_pool_aggregate(list),
        ),
        PoolList::Unavailable => (None, PoolAggregate::default()),
    };

    StorageFragment {
        total: round2(fields.number_or_zero("total")),
        used: round2(fields.number_or_zero("used")),
        available: round2(fields.number_or_zero("available")),
        disk_count,
        disks,
        pools,
        local_pool,
        guest_pools,
    }
}

fn storage_pools(raw: &Value) -> Vec<StoragePool> {
    Fields::new(raw)
        .array("storage")
        .iter()
        .map(|entry| {
            let pool = Fields::new(entry);
            StoragePool {
                name: pool.text_or("name", NOT_AVAILABLE),
                kind: pool.text_or("type", "unknown"),
                status: pool.text_or("status", "unknown"),
                total: round2(pool.number_or_zero("total")),
                used: round2(pool.number_or_zero("used")),
                available: round2(pool.number_or_zero("available")),
                percent: round2(pool.number_or_zero("percent")),
            }
        })
        .collect()
}

fn guest_pool_aggregate(pools: &[StoragePool]) -> PoolAggregate {
    let guest_pools = pools
        .iter()
        .filter(|p| p.name != "local" && GUEST_POOL_TYPES.contains(&p.kind.as_str()));
    let (total, used, available) = guest_pools.fold((0.0, 0.0, 0.0), |acc, p| {
        (acc.0 + p.total, acc.1 + p.used, acc.2 + p.available)
    });
    PoolAggregate {
        total: round2(total),
        used: round2(used),
        available: round2(available),
        percent: ratio_percent(used, total),
    }
}

/// Per-disk SMART detail. Health counts come from the backend when it sends
/// them and are otherwise derived from the per-disk classification.
pub fn storage_detail_fragment(raw: &Value) -> StorageDetailFragment {
    let fields = Fields::new(raw);
    let disks: Vec<DiskDetail> = fields.array("disks").iter().map(disk_detail).collect();
    let zfs_pools = fields
        .array("zfs_pools")
        .iter()
        .map(|entry| {
            let pool = Fields::new(entry);
            ZfsPool {
                name: pool.text_or("name", NOT_AVAILABLE),
                size: pool.text_or("size", NOT_AVAILABLE),
                allocated: pool.text_or("allocated", NOT_AVAILABLE),
                free: pool.text_or("free", NOT_AVAILABLE),
                health: DiskHealth::classify(pool.text("health")),
            }
        })
        .collect();

    let reported_or = |key: &str, health: DiskHealth| {
        fields
            .number(key)
            .map(|_| fields.count(key))
            .unwrap_or_else(|| disks.iter().filter(|d| d.health == health).count() as u64)
    };

    StorageDetailFragment {
        disk_count: fields
            .number("disk_count")
            .map(|_| fields.count("disk_count"))
            .unwrap_or(disks.len() as u64),
        healthy_disks: reported_or("healthy_disks", DiskHealth::Healthy),
        warning_disks: reported_or("warning_disks", DiskHealth::Warning),
        critical_disks: reported_or("critical_disks", DiskHealth::Critical),
        disks,
        zfs_pools,
    }
}

fn disk_detail(raw: &Value) -> DiskDetail {
    let disk = Fields::new(raw);
    // NVMe reports wear as percentage used, SATA SSDs as life left.
    let wear_percent = disk
        .number("percentage_used")
        .or_else(|| disk.number("ssd_life_left").map(|left| 100.0 - left))
        .or_else(|| disk.number("media_wearout_indicator").map(|left| 100.0 - left))
        .map(|p| round2(p.clamp(0.0, 100.0)));

    DiskDetail {
        name: disk.text_or("name", NOT_AVAILABLE),
        model: disk.text_or("model", UNKNOWN),
        serial: disk.text_or("serial", UNKNOWN),
        size: disk.text_or("size_formatted", NOT_AVAILABLE),
        health: DiskHealth::classify(disk.text("health")),
        smart_status: disk.text_or("smart_status", "unknown"),
        temperature: round2(disk.number_or_zero("temperature")),
        power_on_hours: disk.count("power_on_hours"),
        power_cycles: disk.count("power_cycles"),
        reallocated_sectors: disk.count("reallocated_sectors"),
        pending_sectors: disk.count("pending_sectors"),
        crc_errors: disk.count("crc_errors"),
        wear_percent,
    }
}

pub fn network_fragment(raw: &Value) -> NetworkFragment {
    let fields = Fields::new(raw);
    let interfaces = fields.array("interfaces");
    let interfaces_up = interfaces
        .iter()
        .filter(|i| Fields::new(i).text("status") == Some("up"))
        .count();
    let traffic = fields.nested("traffic");

    NetworkFragment {
        interface_count: interfaces.len(),
        interfaces_up,
        physical_active: fields.count("physical_active_count"),
        physical_total: fields.count("physical_total_count"),
        bridge_active: fields.count("bridge_active_count"),
        bridge_total: fields.count("bridge_total_count"),
        traffic: TrafficCounters {
            bytes_sent: traffic.number_or_zero("bytes_sent").max(0.0),
            bytes_recv: traffic.number_or_zero("bytes_recv").max(0.0),
            packets_sent: traffic.count("packets_sent"),
            packets_recv: traffic.count("packets_recv"),
        },
    }
}
