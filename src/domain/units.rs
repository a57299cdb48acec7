// Unit conversion and display helpers
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Round to two decimals, the precision every figure on the dashboard uses.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

pub fn bytes_to_gb(bytes: f64) -> f64 {
    round2(bytes / GIB)
}

pub fn bytes_to_mb(bytes: f64) -> f64 {
    round2(bytes / MIB)
}

/// `0.42` -> `42.0`
pub fn fraction_to_percent(fraction: f64) -> f64 {
    round2(fraction * 100.0)
}

/// `part / whole` as a percentage, 0 when the whole is zero or missing.
pub fn ratio_percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 || part <= 0.0 {
        return 0.0;
    }
    round2(part / whole * 100.0)
}

/// Network display preference, injected at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkUnit {
    #[default]
    Bytes,
    Bits,
}

impl NetworkUnit {
    /// Scale a byte-denominated quantity into this unit.
    pub fn scale(&self, bytes: f64) -> f64 {
        match self {
            Self::Bytes => bytes,
            Self::Bits => bytes * 8.0,
        }
    }

    /// Human readable traffic total, e.g. `1.50 GB` or `12.00 Gb`.
    pub fn format_traffic(&self, bytes: f64) -> String {
        let (base, suffixes) = match self {
            Self::Bytes => (1024.0, ["B", "KB", "MB", "GB", "TB"]),
            Self::Bits => (1000.0, ["b", "Kb", "Mb", "Gb", "Tb"]),
        };
        let mut value = self.scale(bytes.max(0.0));
        let mut idx = 0;
        while value >= base && idx < suffixes.len() - 1 {
            value /= base;
            idx += 1;
        }
        format!("{:.2} {}", value, suffixes[idx])
    }

    /// Label for rate axes of VM charts (which are expressed in MB).
    pub fn rate_label(&self) -> &'static str {
        match self {
            Self::Bytes => "MB",
            Self::Bits => "Mb",
        }
    }
}

impl fmt::Display for NetworkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes => f.write_str("bytes"),
            Self::Bits => f.write_str("bits"),
        }
    }
}

impl FromStr for NetworkUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bytes" => Ok(Self::Bytes),
            "bits" => Ok(Self::Bits),
            other => Err(format!("unknown network unit: {}", other)),
        }
    }
}
