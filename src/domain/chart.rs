// Display-ready chart models

use super::timeframe::Timeframe;
use serde::Serialize;

/// Y-axis domain `[0, max observed]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let max = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);
        Self { min: 0.0, max }
    }
}

/// One node sample, in payload order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePoint {
    pub label: String,
    pub timestamp: i64,
    /// Percent
    pub cpu: f64,
    pub load: f64,
    /// GB
    pub memory_total: f64,
    pub memory_used: f64,
    pub memory_free: f64,
    pub memory_zfs_arc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeChart {
    pub timeframe: Timeframe,
    pub points: Vec<NodePoint>,
    pub tick_interval: usize,
    pub cpu_axis: AxisRange,
    pub load_axis: AxisRange,
    pub memory_axis: AxisRange,
}

/// One guest sample. Rates are MB (or Mb in bits mode).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmPoint {
    pub label: String,
    pub timestamp: i64,
    pub cpu: f64,
    pub memory: f64,
    pub memory_gb: f64,
    pub max_memory_gb: f64,
    pub netin: f64,
    pub netout: f64,
    pub diskread: f64,
    pub diskwrite: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmChart {
    pub vmid: u64,
    pub timeframe: Timeframe,
    pub points: Vec<VmPoint>,
    pub tick_interval: usize,
    pub percent_axis: AxisRange,
    pub memory_axis: AxisRange,
    pub network_axis: AxisRange,
    pub disk_axis: AxisRange,
    pub rate_unit: &'static str,
}
