use crate::domain::source::{
    MAX_CADENCE, RetryPolicy, SourceDescriptor, SourceId, default_catalog,
};
use crate::domain::timeframe::{Tab, Timeframe};
use crate::domain::units::NetworkUnit;
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub backend: BackendSettings,
    pub server: ServerSettings,
    #[serde(default)]
    pub dashboard: DashboardSettings,
    #[serde(default)]
    pub sources: HashMap<String, SourceOverride>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub listen: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardSettings {
    pub initial_tab: Tab,
    pub timeframe: Timeframe,
    pub network_unit: NetworkUnit,
    pub utc_offset_minutes: i32,
    pub target_tick_count: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            initial_tab: Tab::Overview,
            timeframe: Timeframe::Day,
            network_unit: NetworkUnit::Bytes,
            utc_offset_minutes: 0,
            target_tick_count: 8,
        }
    }
}

impl DashboardSettings {
    /// Offset used for chart labels; out-of-range values fall back to UTC.
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceOverride {
    pub foreground_secs: Option<u64>,
    pub background_secs: Option<u64>,
    #[serde(default)]
    pub paused_in_background: bool,
    pub retry: Option<RetryPolicy>,
}

fn default_request_timeout_ms() -> u64 {
    5000
}

pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = config::Config::builder()
        .set_default("backend.base_url", "http://127.0.0.1:8008")?
        .set_default("server.listen", "0.0.0.0:8080")?
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(config::Environment::with_prefix("MONITOR").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

impl MonitorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }

    /// Stock catalog with the configured per-source overrides applied.
    /// Unknown source names are reported and skipped.
    pub fn source_catalog(&self) -> Vec<SourceDescriptor> {
        for name in self.sources.keys() {
            if name.parse::<SourceId>().is_err() {
                tracing::warn!("Ignoring overrides for unknown source {}", name);
            }
        }
        default_catalog()
            .into_iter()
            .map(|descriptor| match self.sources.get(descriptor.id.as_str()) {
                Some(overrides) => apply_override(descriptor, overrides),
                None => descriptor,
            })
            .collect()
    }
}

fn apply_override(mut descriptor: SourceDescriptor, overrides: &SourceOverride) -> SourceDescriptor {
    let id = descriptor.id;
    if let Some(secs) = overrides.foreground_secs.filter(|s| *s > 0) {
        descriptor.foreground = clamp_cadence(id, "foreground", secs);
    }
    if let Some(secs) = overrides.background_secs.filter(|s| *s > 0) {
        descriptor.background = Some(clamp_cadence(id, "background", secs));
    }
    if overrides.paused_in_background {
        descriptor.background = None;
    }
    if let Some(retry) = overrides.retry {
        descriptor.retry = retry;
    }
    descriptor
}

fn clamp_cadence(id: SourceId, which: &str, secs: u64) -> Duration {
    let cadence = Duration::from_secs(secs);
    if cadence > MAX_CADENCE {
        tracing::warn!(
            "{} {} cadence of {}s exceeds {}s, clamping",
            id,
            which,
            secs,
            MAX_CADENCE.as_secs()
        );
        return MAX_CADENCE;
    }
    cadence
}

/// Replace `${var}` placeholders in an endpoint template with URL-encoded values.
pub fn prepare_endpoint(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, &urlencoding::encode(value));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::Backoff;

    #[test]
    fn test_prepare_endpoint() {
        let mut vars = HashMap::new();
        vars.insert("timeframe".to_string(), "week".to_string());
        vars.insert("node".to_string(), "pve 1".to_string());

        let template = "/api/nodes/${node}/metrics?timeframe=${timeframe}";
        let result = prepare_endpoint(template, &vars);

        assert_eq!(result, "/api/nodes/pve%201/metrics?timeframe=week");
    }

    #[test]
    fn test_source_overrides_apply_to_catalog() {
        let mut sources = HashMap::new();
        sources.insert(
            "system".to_string(),
            SourceOverride {
                foreground_secs: Some(5),
                paused_in_background: true,
                retry: Some(RetryPolicy {
                    max_attempts: 5,
                    backoff: Backoff::Linear {
                        initial_ms: 100,
                        step_ms: 100,
                    },
                }),
                ..SourceOverride::default()
            },
        );
        sources.insert("bogus".to_string(), SourceOverride::default());
        let config = MonitorConfig {
            backend: BackendSettings {
                base_url: "http://pve:8008".to_string(),
                request_timeout_ms: 1000,
            },
            server: ServerSettings {
                listen: "127.0.0.1:0".to_string(),
            },
            dashboard: DashboardSettings::default(),
            sources,
        };

        let catalog = config.source_catalog();
        assert_eq!(catalog.len(), 7);
        let system = catalog.iter().find(|d| d.id == SourceId::System).unwrap();
        assert_eq!(system.foreground, Duration::from_secs(5));
        assert_eq!(system.background, None);
        assert_eq!(system.retry.max_attempts, 5);

        let vms = catalog.iter().find(|d| d.id == SourceId::Vms).unwrap();
        assert_eq!(vms.foreground, Duration::from_secs(59));
    }

    #[test]
    fn test_oversized_cadence_is_clamped() {
        let descriptor = default_catalog().into_iter().find(|d| d.id == SourceId::Health).unwrap();
        let overrides = SourceOverride {
            foreground_secs: Some(u64::MAX),
            background_secs: Some(7 * 24 * 60 * 60),
            ..SourceOverride::default()
        };
        let clamped = apply_override(descriptor, &overrides);
        assert_eq!(clamped.foreground, MAX_CADENCE);
        assert_eq!(clamped.background, Some(MAX_CADENCE));

        let descriptor = default_catalog().into_iter().find(|d| d.id == SourceId::Health).unwrap();
        let overrides = SourceOverride {
            foreground_secs: Some(86_400),
            background_secs: Some(0),
            ..SourceOverride::default()
        };
        let kept = apply_override(descriptor.clone(), &overrides);
        assert_eq!(kept.foreground, Duration::from_secs(86_400));
        assert_eq!(kept.background, descriptor.background);
    }

    #[test]
    fn test_display_offset_from_minutes() {
        let settings = DashboardSettings {
            utc_offset_minutes: 90,
            ..DashboardSettings::default()
        };
        assert_eq!(settings.display_offset().local_minus_utc(), 5400);
    }
}
