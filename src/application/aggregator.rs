// Aggregator - sole writer of the view model
use crate::domain::fragment::Fragment;
use crate::domain::source::{PollTicket, SourceId};
use crate::domain::timeframe::{Tab, Timeframe};
use crate::domain::view_model::{SourceState, ViewContext, ViewModel};
use crate::error::{ErrorKind, SourceError};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

pub type PollResult = Result<Fragment, SourceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Started before the currently applied poll; dropped.
    Stale,
}

/// Holds the last-known-good state of every source and republishes a merged
/// snapshot after each change. Sources are independent: an update touches
/// exactly one entry.
pub struct Aggregator {
    states: BTreeMap<SourceId, SourceState>,
    ctx: ViewContext,
    publisher: watch::Sender<Arc<ViewModel>>,
}

impl Aggregator {
    pub fn new(
        sources: impl IntoIterator<Item = SourceId>,
        active_tab: Tab,
        timeframe: Timeframe,
    ) -> (Self, watch::Receiver<Arc<ViewModel>>) {
        let states: BTreeMap<SourceId, SourceState> = sources
            .into_iter()
            .map(|id| (id, SourceState::initial()))
            .collect();
        let ctx = ViewContext {
            revision: 0,
            active_tab,
            timeframe,
            refreshing: false,
        };
        let initial = Arc::new(ViewModel::merge(&states, ctx, Utc::now()));
        let (publisher, receiver) = watch::channel(initial);
        (
            Self {
                states,
                ctx,
                publisher,
            },
            receiver,
        )
    }

    pub fn snapshot(&self) -> Arc<ViewModel> {
        self.publisher.borrow().clone()
    }

    /// A poll for `id` has been issued.
    pub fn mark_loading(&mut self, id: SourceId, ticket: PollTicket) {
        let state = self.states.entry(id).or_insert_with(SourceState::initial);
        state.pending = Some(ticket);
        state.is_loading = true;
        self.publish();
    }

    /// A poll for `id` that is no longer outstanding and will never report.
    pub fn clear_pending(&mut self, id: SourceId, ticket: PollTicket) {
        if let Some(state) = self.states.get_mut(&id) {
            if state.pending == Some(ticket) {
                state.pending = None;
                state.is_loading = false;
                self.publish();
            }
        }
    }

    /// Apply the outcome of the poll identified by `ticket`. Results are
    /// ordered by request start: anything older than the applied poll is
    /// discarded. A failure keeps the previous fragment.
    pub fn apply_update(&mut self, id: SourceId, result: PollResult, ticket: PollTicket) -> ApplyOutcome {
        let state = self.states.entry(id).or_insert_with(SourceState::initial);
        if state.pending == Some(ticket) {
            state.pending = None;
        }
        state.is_loading = state.pending.is_some();

        if state.applied.is_some_and(|applied| ticket < applied) {
            tracing::debug!(
                "Discarding stale {} result started at {} (applied {:?})",
                id,
                ticket.started_at,
                state.applied.map(|t| t.started_at)
            );
            self.publish();
            return ApplyOutcome::Stale;
        }

        state.applied = Some(ticket);
        state.last_attempt_at = Some(ticket.started_at);
        match result {
            Ok(fragment) if fragment.source() == id => {
                state.last_success = Some(fragment);
                state.last_error = None;
                state.last_updated_at = Some(ticket.started_at);
            }
            Ok(fragment) => {
                tracing::error!("Fragment for {} delivered to source {}", fragment.source(), id);
                state.last_error = Some(SourceError {
                    kind: ErrorKind::MalformedPayload,
                    cause: ErrorKind::MalformedPayload,
                    attempts: 1,
                    message: format!("fragment for {} delivered to {}", fragment.source(), id),
                });
            }
            Err(err) => {
                state.last_error = Some(err);
            }
        }
        self.publish();
        ApplyOutcome::Applied
    }

    pub fn set_refreshing(&mut self, refreshing: bool) {
        if self.ctx.refreshing != refreshing {
            self.ctx.refreshing = refreshing;
            self.publish();
        }
    }

    pub fn set_active_tab(&mut self, tab: Tab) {
        if self.ctx.active_tab != tab {
            self.ctx.active_tab = tab;
            self.publish();
        }
    }

    pub fn set_timeframe(&mut self, timeframe: Timeframe) {
        if self.ctx.timeframe != timeframe {
            self.ctx.timeframe = timeframe;
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.ctx.revision += 1;
        let view = ViewModel::merge(&self.states, self.ctx, Utc::now());
        self.publisher.send_replace(Arc::new(view));
    }
}
