// Chart data transformer - raw time-series samples to display-ready points
//
// Pure functions: the same (samples, timeframe, options) always yields the
// same chart. Point order is payload order.
use crate::domain::chart::{AxisRange, NodeChart, NodePoint, VmChart, VmPoint};
use crate::domain::payload::Fields;
use crate::domain::timeframe::Timeframe;
use crate::domain::units::{bytes_to_gb, bytes_to_mb, fraction_to_percent, ratio_percent, round2, NetworkUnit};
use chrono::{FixedOffset, Offset, Utc};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartOptions {
    pub offset: FixedOffset,
    pub target_tick_count: usize,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
            target_tick_count: 8,
        }
    }
}

/// `ceil(point_count / target)`, so long series keep roughly `target` labels.
pub fn tick_interval(point_count: usize, target_tick_count: usize) -> usize {
    point_count.div_ceil(target_tick_count.max(1))
}

/// The `data` array of a time-series response. Anything else is a schema
/// mismatch for the whole payload.
pub fn series_entries(raw: &Value) -> Result<&[Value], String> {
    raw.get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| "time-series payload has no `data` array".to_string())
}

fn sample_time(fields: &Fields<'_>) -> i64 {
    fields.number("time").map(|t| t as i64).unwrap_or(0)
}

pub fn node_chart(samples: &[Value], timeframe: Timeframe, options: &ChartOptions) -> NodeChart {
    let points: Vec<NodePoint> = samples
        .iter()
        .map(|raw| {
            let fields = Fields::new(raw);
            let timestamp = sample_time(&fields);
            NodePoint {
                label: timeframe.time_label(timestamp, &options.offset),
                timestamp,
                cpu: fraction_to_percent(fields.number_or_zero("cpu")),
                load: round2(fields.first_number("loadavg").unwrap_or(0.0)),
                memory_total: bytes_to_gb(fields.number_or_zero("memtotal")),
                memory_used: bytes_to_gb(fields.number_or_zero("memused")),
                memory_free: bytes_to_gb(fields.number_or_zero("memfree")),
                memory_zfs_arc: bytes_to_gb(fields.number_or_zero("zfsarc")),
            }
        })
        .collect();

    NodeChart {
        timeframe,
        tick_interval: tick_interval(points.len(), options.target_tick_count),
        cpu_axis: AxisRange::from_values(points.iter().map(|p| p.cpu)),
        load_axis: AxisRange::from_values(points.iter().map(|p| p.load)),
        memory_axis: AxisRange::from_values(points.iter().flat_map(|p| {
            [p.memory_total, p.memory_used, p.memory_free, p.memory_zfs_arc]
        })),
        points,
    }
}

pub fn vm_chart(
    vmid: u64,
    samples: &[Value],
    timeframe: Timeframe,
    options: &ChartOptions,
    unit: NetworkUnit,
) -> VmChart {
    let points: Vec<VmPoint> = samples
        .iter()
        .map(|raw| {
            let fields = Fields::new(raw);
            let timestamp = sample_time(&fields);
            let mem = fields.number_or_zero("mem");
            let maxmem = fields.number_or_zero("maxmem");
            VmPoint {
                label: timeframe.time_label(timestamp, &options.offset),
                timestamp,
                cpu: fraction_to_percent(fields.number_or_zero("cpu")),
                memory: ratio_percent(mem, maxmem),
                memory_gb: bytes_to_gb(mem),
                max_memory_gb: bytes_to_gb(maxmem),
                netin: round2(unit.scale(bytes_to_mb(fields.number_or_zero("netin")))),
                netout: round2(unit.scale(bytes_to_mb(fields.number_or_zero("netout")))),
                diskread: bytes_to_mb(fields.number_or_zero("diskread")),
                diskwrite: bytes_to_mb(fields.number_or_zero("diskwrite")),
            }
        })
        .collect();

    VmChart {
        vmid,
        timeframe,
        tick_interval: tick_interval(points.len(), options.target_tick_count),
        percent_axis: AxisRange::from_values(points.iter().flat_map(|p| [p.cpu, p.memory])),
        memory_axis: AxisRange::from_values(points.iter().flat_map(|p| [p.memory_gb, p.max_memory_gb])),
        network_axis: AxisRange::from_values(points.iter().flat_map(|p| [p.netin, p.netout])),
        disk_axis: AxisRange::from_values(points.iter().flat_map(|p| [p.diskread, p.diskwrite])),
        rate_unit: unit.rate_label(),
        points,
    }
}
