// Application state for HTTP handlers
use crate::application::chart_transformer::ChartOptions;
use crate::application::scheduler::SchedulerHandle;
use crate::domain::source::RetryPolicy;
use crate::domain::units::NetworkUnit;
use crate::infrastructure::fetch::FetchClient;
use tokio::sync::watch;

pub struct AppState {
    pub scheduler: SchedulerHandle,
    /// Used for on-demand VM charts, which are not scheduled.
    pub fetch: FetchClient,
    pub units: watch::Sender<NetworkUnit>,
    pub chart: ChartOptions,
    pub vm_retry: RetryPolicy,
}

impl AppState {
    pub fn network_unit(&self) -> NetworkUnit {
        *self.units.borrow()
    }
}
