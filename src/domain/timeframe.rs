// Timeframes for time-series sources and the dashboard's logical views
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Window requested from the time-series endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::Hour,
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
        Timeframe::Year,
    ];

    /// Value sent to the backend as `?timeframe=`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Compact label used next to totals ("24h", "7d", ...).
    pub fn short_label(&self) -> &'static str {
        match self {
            Self::Hour => "1h",
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Year => "1y",
        }
    }

    /// Axis label for a sample taken at `epoch_seconds`.
    ///
    /// Sub-day windows render `HH:MM` (24-hour), week renders `Mon D, HH:MM`,
    /// month renders `Mon D` and year renders `Mon YYYY`. The result depends
    /// only on the timestamp, the timeframe and the display offset.
    pub fn time_label(&self, epoch_seconds: i64, offset: &FixedOffset) -> String {
        let Some(utc) = DateTime::from_timestamp(epoch_seconds, 0) else {
            return "N/A".to_string();
        };
        let local = utc.with_timezone(offset);
        let pattern = match self {
            Self::Hour | Self::Day => "%H:%M",
            Self::Week => "%b %-d, %H:%M",
            Self::Month => "%b %-d",
            Self::Year => "%b %Y",
        };
        local.format(pattern).to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown timeframe: {}", s))
    }
}

/// Logical views of the dashboard. The active one decides which sources
/// poll at their foreground cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Overview,
    Storage,
    Network,
    Vms,
    Hardware,
    Terminal,
    Logs,
    Settings,
}

impl Tab {
    pub const ALL: [Tab; 8] = [
        Tab::Overview,
        Tab::Storage,
        Tab::Network,
        Tab::Vms,
        Tab::Hardware,
        Tab::Terminal,
        Tab::Logs,
        Tab::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Vms => "vms",
            Self::Hardware => "hardware",
            Self::Terminal => "terminal",
            Self::Logs => "logs",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tab::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown tab: {}", s))
    }
}
