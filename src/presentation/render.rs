// Render-time projection of the view model
use crate::domain::source::SourceId;
use crate::domain::units::NetworkUnit;
use crate::domain::view_model::{SlotStatus, ViewModel};
use futures::stream::Stream;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tokio::sync::watch;

/// Traffic totals formatted in the current unit preference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkDisplay {
    pub unit: NetworkUnit,
    pub sent: String,
    pub received: String,
}

#[derive(Serialize)]
struct DashboardBody<'a> {
    #[serde(flatten)]
    view: &'a ViewModel,
    network_unit: NetworkUnit,
    network_display: Option<NetworkDisplay>,
    timeframe_label: &'static str,
    /// Sources whose last poll failed, whether or not a value is shown.
    degraded_sources: Vec<SourceId>,
}

/// A published snapshot paired with the unit preference it is rendered in.
/// The snapshot itself is never modified.
#[derive(Debug, Clone)]
pub struct RenderedDashboard {
    pub view: Arc<ViewModel>,
    pub unit: NetworkUnit,
}

impl RenderedDashboard {
    pub fn new(view: Arc<ViewModel>, unit: NetworkUnit) -> Self {
        Self { view, unit }
    }

    pub fn network_display(&self) -> Option<NetworkDisplay> {
        self.view.network.value.as_ref().map(|network| NetworkDisplay {
            unit: self.unit,
            sent: self.unit.format_traffic(network.traffic.bytes_sent),
            received: self.unit.format_traffic(network.traffic.bytes_recv),
        })
    }

    pub fn degraded_sources(&self) -> Vec<SourceId> {
        SourceId::ALL
            .into_iter()
            .filter(|id| matches!(self.view.slot_status(*id), SlotStatus::Stale | SlotStatus::Unavailable))
            .collect()
    }
}

impl Serialize for RenderedDashboard {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DashboardBody {
            view: &self.view,
            network_unit: self.unit,
            network_display: self.network_display(),
            timeframe_label: self.view.timeframe.short_label(),
            degraded_sources: self.degraded_sources(),
        }
        .serialize(serializer)
    }
}

/// Current snapshot first, then one frame per published snapshot or unit
/// change. Ends when either sender is dropped.
pub fn rendered_stream(
    mut views: watch::Receiver<Arc<ViewModel>>,
    mut units: watch::Receiver<NetworkUnit>,
) -> impl Stream<Item = RenderedDashboard> + Send + 'static {
    async_stream::stream! {
        loop {
            let view = views.borrow_and_update().clone();
            let unit = *units.borrow_and_update();
            yield RenderedDashboard::new(view, unit);

            let changed = tokio::select! {
                changed = views.changed() => changed,
                changed = units.changed() => changed,
            };
            if changed.is_err() {
                break;
            }
        }
    }
}
