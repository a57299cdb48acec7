// Source descriptors - what each backend endpoint is and how often to poll it
use super::timeframe::Tab;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    System,
    Health,
    NodeMetrics,
    Vms,
    Storage,
    StorageDetail,
    Network,
}

impl SourceId {
    pub const ALL: [SourceId; 7] = [
        SourceId::System,
        SourceId::Health,
        SourceId::NodeMetrics,
        SourceId::Vms,
        SourceId::Storage,
        SourceId::StorageDetail,
        SourceId::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Health => "health",
            Self::NodeMetrics => "node_metrics",
            Self::Vms => "vms",
            Self::Storage => "storage",
            Self::StorageDetail => "storage_detail",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown source: {}", s))
    }
}

/// Delay between attempts of the fetch primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Linear { initial_ms: u64, step_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed { delay_ms: 0 },
        }
    }

    pub const fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay_ms },
        }
    }

    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Linear {
                initial_ms,
                step_ms,
            } => {
                let steps = u64::from(attempt.saturating_sub(1));
                Duration::from_millis(initial_ms.saturating_add(step_ms.saturating_mul(steps)))
            }
        }
    }
}

/// Longest accepted poll interval.
pub const MAX_CADENCE: Duration = Duration::from_secs(24 * 60 * 60);

/// Immutable description of one source, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub id: SourceId,
    /// Path template relative to the backend base URL, `${var}` placeholders allowed.
    pub endpoint: String,
    /// Second endpoint merged into the same fragment (storage pools).
    pub companion_endpoint: Option<String>,
    /// Views that consume this source; while one is active the source polls
    /// at its foreground cadence.
    pub views: Vec<Tab>,
    pub foreground: Duration,
    /// `None` pauses the timer while the source is in the background.
    pub background: Option<Duration>,
    pub retry: RetryPolicy,
    pub schema_version: u32,
}

impl SourceDescriptor {
    pub fn cadence_for(&self, active: Tab) -> Option<Duration> {
        if self.views.contains(&active) {
            Some(self.foreground)
        } else {
            self.background
        }
    }

    pub fn is_foreground(&self, active: Tab) -> bool {
        self.views.contains(&active)
    }

    /// Sources whose endpoint depends on the selected timeframe re-poll when it changes.
    pub fn is_timeframe_sensitive(&self) -> bool {
        self.endpoint.contains("${timeframe}")
    }
}

/// The built-in set of sources with the dashboard's stock cadences.
pub fn default_catalog() -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor {
            id: SourceId::System,
            endpoint: "/api/system".to_string(),
            companion_endpoint: None,
            views: vec![Tab::Overview],
            foreground: Duration::from_secs(9),
            background: Some(Duration::from_secs(60)),
            retry: RetryPolicy::fixed(3, 500),
            schema_version: 1,
        },
        SourceDescriptor {
            id: SourceId::Health,
            endpoint: "/api/system-info".to_string(),
            companion_endpoint: None,
            views: vec![Tab::Overview],
            foreground: Duration::from_secs(30),
            background: Some(Duration::from_secs(60)),
            retry: RetryPolicy::single_attempt(),
            schema_version: 1,
        },
        SourceDescriptor {
            id: SourceId::NodeMetrics,
            endpoint: "/api/node/metrics?timeframe=${timeframe}".to_string(),
            companion_endpoint: None,
            views: vec![Tab::Overview],
            foreground: Duration::from_secs(60),
            background: None,
            retry: RetryPolicy::single_attempt(),
            schema_version: 1,
        },
        SourceDescriptor {
            id: SourceId::Vms,
            endpoint: "/api/vms".to_string(),
            companion_endpoint: None,
            views: vec![Tab::Overview, Tab::Vms],
            foreground: Duration::from_secs(59),
            background: Some(Duration::from_secs(300)),
            retry: RetryPolicy::single_attempt(),
            schema_version: 1,
        },
        SourceDescriptor {
            id: SourceId::Storage,
            endpoint: "/api/storage/summary".to_string(),
            companion_endpoint: Some("/api/proxmox-storage".to_string()),
            views: vec![Tab::Overview, Tab::Storage],
            foreground: Duration::from_secs(59),
            background: Some(Duration::from_secs(300)),
            retry: RetryPolicy::single_attempt(),
            schema_version: 1,
        },
        // Per-disk health only matters on the storage tab.
        SourceDescriptor {
            id: SourceId::StorageDetail,
            endpoint: "/api/storage".to_string(),
            companion_endpoint: None,
            views: vec![Tab::Storage],
            foreground: Duration::from_secs(60),
            background: None,
            retry: RetryPolicy::single_attempt(),
            schema_version: 1,
        },
        SourceDescriptor {
            id: SourceId::Network,
            endpoint: "/api/network/summary".to_string(),
            companion_endpoint: None,
            views: vec![Tab::Overview, Tab::Network],
            foreground: Duration::from_secs(59),
            background: Some(Duration::from_secs(300)),
            retry: RetryPolicy::single_attempt(),
            schema_version: 1,
        },
    ]
}

/// Identity of one poll. Ordered by request start time, then by issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PollTicket {
    pub started_at: DateTime<Utc>,
    pub seq: u64,
}

impl PollTicket {
    pub fn new(started_at: DateTime<Utc>, seq: u64) -> Self {
        Self { started_at, seq }
    }
}
