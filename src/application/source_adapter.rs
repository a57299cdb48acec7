// Source adapter trait - one implementation per backend data source
use crate::domain::fragment::Fragment;
use crate::domain::source::SourceId;
use crate::domain::timeframe::Timeframe;
use crate::error::FetchError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Per-poll inputs handed to an adapter.
#[derive(Debug, Clone)]
pub struct PollContext {
    pub timeframe: Timeframe,
    /// Cancelled when the poll is abandoned (superseded or torn down).
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    /// Fetch and normalize one fragment. Field-level gaps are filled with
    /// defaults; only an unreachable source or an unusable payload is an error.
    async fn fetch(&self, ctx: &PollContext) -> Result<Fragment, FetchError>;
}
