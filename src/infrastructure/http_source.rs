// HTTP-backed source adapter
use crate::application::chart_transformer::{node_chart, series_entries, vm_chart, ChartOptions};
use crate::application::source_adapter::{PollContext, SourceAdapter};
use crate::domain::chart::VmChart;
use crate::domain::fragment::Fragment;
use crate::domain::source::{RetryPolicy, SourceDescriptor, SourceId};
use crate::domain::timeframe::Timeframe;
use crate::domain::units::NetworkUnit;
use crate::error::FetchError;
use crate::infrastructure::config::prepare_endpoint;
use crate::infrastructure::fetch::FetchClient;
use crate::infrastructure::payload_mapper::{
    health_fragment, network_fragment, storage_detail_fragment, storage_fragment, system_fragment,
    vm_fragment,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

pub struct HttpSourceAdapter {
    client: FetchClient,
    descriptor: SourceDescriptor,
    chart: ChartOptions,
}

impl HttpSourceAdapter {
    pub fn new(client: FetchClient, descriptor: SourceDescriptor, chart: ChartOptions) -> Self {
        Self {
            client,
            descriptor,
            chart,
        }
    }

    fn endpoint(&self, timeframe: Timeframe) -> String {
        prepare_endpoint(&self.descriptor.endpoint, &timeframe_vars(timeframe))
    }

    async fn storage(&self, endpoint: &str, ctx: &PollContext) -> Result<Fragment, FetchError> {
        let retry = &self.descriptor.retry;
        let summary = self.client.get_json(endpoint, retry, &ctx.cancel);
        let companion = async {
            match &self.descriptor.companion_endpoint {
                Some(path) => Some(self.client.get_json(path, retry, &ctx.cancel).await),
                None => None,
            }
        };
        let (summary, companion) = futures::join!(summary, companion);
        let summary = require_object(summary?, endpoint)?;

        let pools = match companion {
            Some(Ok(pools)) => Some(pools),
            Some(Err(FetchError::Cancelled)) => return Err(FetchError::Cancelled),
            Some(Err(e)) => {
                tracing::warn!("Storage pools unavailable, keeping summary: {}", e);
                None
            }
            None => None,
        };
        Ok(Fragment::Storage(storage_fragment(&summary, pools.as_ref())))
    }
}

#[async_trait]
impl SourceAdapter for HttpSourceAdapter {
    fn source(&self) -> SourceId {
        self.descriptor.id
    }

    async fn fetch(&self, ctx: &PollContext) -> Result<Fragment, FetchError> {
        let endpoint = self.endpoint(ctx.timeframe);
        if self.descriptor.id == SourceId::Storage {
            return self.storage(&endpoint, ctx).await;
        }
        let raw = self
            .client
            .get_json(&endpoint, &self.descriptor.retry, &ctx.cancel)
            .await?;
        self.normalize(raw, &endpoint, ctx.timeframe)
    }
}

impl HttpSourceAdapter {
    fn normalize(&self, raw: Value, endpoint: &str, timeframe: Timeframe) -> Result<Fragment, FetchError> {
        let fragment = match self.descriptor.id {
            SourceId::System => Fragment::System(system_fragment(&require_object(raw, endpoint)?)),
            SourceId::Health => Fragment::Health(health_fragment(&require_object(raw, endpoint)?)),
            SourceId::Network => Fragment::Network(network_fragment(&require_object(raw, endpoint)?)),
            SourceId::Storage => Fragment::Storage(storage_fragment(&require_object(raw, endpoint)?, None)),
            SourceId::StorageDetail => {
                Fragment::StorageDetail(storage_detail_fragment(&require_object(raw, endpoint)?))
            }
            SourceId::Vms => {
                if !(raw.is_array() || raw.is_object()) {
                    return Err(malformed(endpoint, "guest list is neither an array nor an object"));
                }
                Fragment::Vms(vm_fragment(&raw))
            }
            SourceId::NodeMetrics => {
                let samples = series_entries(&raw).map_err(|reason| malformed(endpoint, &reason))?;
                Fragment::NodeMetrics(node_chart(samples, timeframe, &self.chart))
            }
        };
        Ok(fragment)
    }
}

/// On-demand VM time-series for the metrics dialog.
pub async fn fetch_vm_chart(
    client: &FetchClient,
    vmid: u64,
    timeframe: Timeframe,
    retry: &RetryPolicy,
    chart: &ChartOptions,
    unit: NetworkUnit,
    cancel: &CancellationToken,
) -> Result<VmChart, FetchError> {
    let endpoint = prepare_endpoint(
        &format!("/api/vms/{}/metrics?timeframe=${{timeframe}}", vmid),
        &timeframe_vars(timeframe),
    );
    let raw = client.get_json(&endpoint, retry, cancel).await?;
    let samples = series_entries(&raw).map_err(|reason| malformed(&endpoint, &reason))?;
    Ok(vm_chart(vmid, samples, timeframe, chart, unit))
}

fn timeframe_vars(timeframe: Timeframe) -> HashMap<String, String> {
    HashMap::from([("timeframe".to_string(), timeframe.as_str().to_string())])
}

fn require_object(raw: Value, endpoint: &str) -> Result<Value, FetchError> {
    if raw.is_object() {
        Ok(raw)
    } else {
        Err(malformed(endpoint, "expected a JSON object"))
    }
}

fn malformed(endpoint: &str, reason: &str) -> FetchError {
    FetchError::MalformedPayload {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    }
}
