// Merged, always fully-shaped view model
use super::chart::NodeChart;
use super::fragment::{
    Fragment, HealthFragment, NetworkFragment, StorageDetailFragment, StorageFragment,
    SystemFragment, VmFragment,
};
use super::source::{PollTicket, SourceId};
use super::timeframe::{Tab, Timeframe};
use crate::error::SourceError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-source record held by the aggregator.
#[derive(Debug, Clone, Default)]
pub struct SourceState {
    pub last_success: Option<Fragment>,
    pub last_error: Option<SourceError>,
    /// Start time of the poll that produced `last_success`.
    pub last_updated_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub is_loading: bool,
    /// Newest poll applied so far, success or failure.
    pub applied: Option<PollTicket>,
    /// Poll currently outstanding.
    pub pending: Option<PollTicket>,
}

impl SourceState {
    /// Before the first poll is issued every source renders as loading.
    pub fn initial() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// Nothing received yet.
    Loading,
    Fresh,
    /// Last poll failed; `value` is the last known good fragment.
    Stale,
    /// Failed and nothing was ever received.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSlot<T> {
    pub status: SlotStatus,
    pub value: Option<T>,
    pub loading: bool,
    pub last_error: Option<SourceError>,
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Start time of the newest applied poll, success or failure.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl<T: Clone> SourceSlot<T> {
    fn from_state(state: Option<&SourceState>, pick: impl Fn(&Fragment) -> Option<&T>) -> Self {
        let Some(state) = state else {
            return Self {
                status: SlotStatus::Loading,
                value: None,
                loading: true,
                last_error: None,
                last_updated_at: None,
                last_attempt_at: None,
            };
        };
        let value = state.last_success.as_ref().and_then(pick).cloned();
        let status = match (&value, &state.last_error) {
            (Some(_), None) => SlotStatus::Fresh,
            (Some(_), Some(_)) => SlotStatus::Stale,
            (None, Some(_)) => SlotStatus::Unavailable,
            (None, None) => SlotStatus::Loading,
        };
        Self {
            status,
            value,
            loading: state.is_loading,
            last_error: state.last_error.clone(),
            last_updated_at: state.last_updated_at,
            last_attempt_at: state.last_attempt_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub source: SourceId,
    pub message: String,
}

const HIGH_TEMPERATURE_C: f64 = 75.0;
const LOCAL_STORAGE_FULL_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub revision: u64,
    pub generated_at: DateTime<Utc>,
    pub active_tab: Tab,
    pub timeframe: Timeframe,
    pub refreshing: bool,
    pub system: SourceSlot<SystemFragment>,
    pub health: SourceSlot<HealthFragment>,
    pub node_metrics: SourceSlot<NodeChart>,
    pub vms: SourceSlot<VmFragment>,
    pub storage: SourceSlot<StorageFragment>,
    pub storage_detail: SourceSlot<StorageDetailFragment>,
    pub network: SourceSlot<NetworkFragment>,
    pub alerts: Vec<Alert>,
}

/// Dashboard-level settings carried into every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewContext {
    pub revision: u64,
    pub active_tab: Tab,
    pub timeframe: Timeframe,
    pub refreshing: bool,
}

impl ViewModel {
    pub fn merge(
        states: &BTreeMap<SourceId, SourceState>,
        ctx: ViewContext,
        now: DateTime<Utc>,
    ) -> Self {
        let get = |id: SourceId| states.get(&id);
        let mut view = Self {
            revision: ctx.revision,
            generated_at: now,
            active_tab: ctx.active_tab,
            timeframe: ctx.timeframe,
            refreshing: ctx.refreshing,
            system: SourceSlot::from_state(get(SourceId::System), |f| match f {
                Fragment::System(v) => Some(v),
                _ => None,
            }),
            health: SourceSlot::from_state(get(SourceId::Health), |f| match f {
                Fragment::Health(v) => Some(v),
                _ => None,
            }),
            node_metrics: SourceSlot::from_state(get(SourceId::NodeMetrics), |f| match f {
                Fragment::NodeMetrics(v) => Some(v),
                _ => None,
            }),
            vms: SourceSlot::from_state(get(SourceId::Vms), |f| match f {
                Fragment::Vms(v) => Some(v),
                _ => None,
            }),
            storage: SourceSlot::from_state(get(SourceId::Storage), |f| match f {
                Fragment::Storage(v) => Some(v),
                _ => None,
            }),
            storage_detail: SourceSlot::from_state(get(SourceId::StorageDetail), |f| match f {
                Fragment::StorageDetail(v) => Some(v),
                _ => None,
            }),
            network: SourceSlot::from_state(get(SourceId::Network), |f| match f {
                Fragment::Network(v) => Some(v),
                _ => None,
            }),
            alerts: Vec::new(),
        };
        view.alerts = view.derive_alerts();
        view
    }

    pub fn slot_status(&self, id: SourceId) -> SlotStatus {
        match id {
            SourceId::System => self.system.status,
            SourceId::Health => self.health.status,
            SourceId::NodeMetrics => self.node_metrics.status,
            SourceId::Vms => self.vms.status,
            SourceId::Storage => self.storage.status,
            SourceId::StorageDetail => self.storage_detail.status,
            SourceId::Network => self.network.status,
        }
    }

    fn derive_alerts(&self) -> Vec<Alert> {
        let mut alerts = Vec::new();
        if let Some(system) = &self.system.value {
            if system.available_updates > 0 {
                alerts.push(Alert {
                    level: AlertLevel::Warning,
                    source: SourceId::System,
                    message: format!("{} updates available", system.available_updates),
                });
            }
        }
        if let Some(vms) = &self.vms.value {
            if vms.stats.stopped > 0 {
                alerts.push(Alert {
                    level: AlertLevel::Info,
                    source: SourceId::Vms,
                    message: format!("{} guests stopped", vms.stats.stopped),
                });
            }
        }
        if let Some(system) = &self.system.value {
            if system.temperature > HIGH_TEMPERATURE_C {
                alerts.push(Alert {
                    level: AlertLevel::Warning,
                    source: SourceId::System,
                    message: "High temperature detected".to_string(),
                });
            }
        }
        let local_full = self
            .storage
            .value
            .as_ref()
            .and_then(|s| s.local_pool.as_ref())
            .is_some_and(|pool| pool.percent > LOCAL_STORAGE_FULL_PERCENT);
        if local_full {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                source: SourceId::Storage,
                message: "System storage almost full".to_string(),
            });
        }
        if let Some(detail) = &self.storage_detail.value {
            if detail.critical_disks > 0 {
                alerts.push(Alert {
                    level: AlertLevel::Warning,
                    source: SourceId::StorageDetail,
                    message: format!("{} disks in critical state", detail.critical_disks),
                });
            }
        }
        alerts
    }
}
