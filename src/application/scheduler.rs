// Poll scheduler - one timeline per source, driven by a single task
//
// The scheduler task owns every timeline and the aggregator. Polls run as
// spawned tasks and report back over a channel, so all state changes happen
// here, one event at a time.
use crate::application::aggregator::Aggregator;
use crate::application::source_adapter::{PollContext, SourceAdapter};
use crate::domain::fragment::Fragment;
use crate::domain::source::{MAX_CADENCE, PollTicket, SourceDescriptor, SourceId};
use crate::domain::timeframe::{Tab, Timeframe};
use crate::domain::view_model::ViewModel;
use crate::error::{FetchError, SchedulerError, SourceError};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const COMMAND_BUFFER: usize = 32;
const COMPLETION_BUFFER: usize = 64;

pub struct SourceRegistration {
    pub descriptor: SourceDescriptor,
    pub adapter: Arc<dyn SourceAdapter>,
}

impl SourceRegistration {
    pub fn new(descriptor: SourceDescriptor, adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            descriptor,
            adapter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollPhase {
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Mount,
    Timer,
    Manual,
    Timeframe,
    TabChange,
}

struct InFlight {
    ticket: PollTicket,
    cancel: CancellationToken,
}

struct SourceTimeline {
    descriptor: SourceDescriptor,
    adapter: Arc<dyn SourceAdapter>,
    phase: PollPhase,
    next_due: Option<Instant>,
    last_started: Option<Instant>,
    in_flight: Option<InFlight>,
}

struct Completion {
    index: usize,
    ticket: PollTicket,
    result: Result<Fragment, FetchError>,
}

/// Outcome of a manual refresh, delivered once every source it covered has reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub sources: Vec<SourceId>,
    pub elapsed: Duration,
}

struct ManualRefresh {
    started: Instant,
    sources: BTreeSet<SourceId>,
    pending: BTreeSet<SourceId>,
    waiters: Vec<oneshot::Sender<RefreshReport>>,
}

enum Command {
    Refresh(oneshot::Sender<RefreshReport>),
    ActivateTab(Tab),
    SetTimeframe(Timeframe),
}

/// Cloneable front door to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<Arc<ViewModel>>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Poll every active source now and wait until each has reported.
    /// A source already being polled is not fetched twice.
    pub async fn refresh(&self) -> Result<RefreshReport, SchedulerError> {
        let (done, wait) = oneshot::channel();
        self.send(Command::Refresh(done)).await?;
        wait.await.map_err(|_| SchedulerError::Stopped)
    }

    pub async fn activate_tab(&self, tab: Tab) -> Result<(), SchedulerError> {
        self.send(Command::ActivateTab(tab)).await
    }

    pub async fn set_timeframe(&self, timeframe: Timeframe) -> Result<(), SchedulerError> {
        self.send(Command::SetTimeframe(timeframe)).await
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewModel>> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> Arc<ViewModel> {
        self.view.borrow().clone()
    }

    /// Cancel every timer and abandon every in-flight poll.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn send(&self, command: Command) -> Result<(), SchedulerError> {
        if self.cancel.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| SchedulerError::Stopped)
    }
}

pub struct PollScheduler {
    timelines: Vec<SourceTimeline>,
    aggregator: Aggregator,
    active_tab: Tab,
    timeframe: Timeframe,
    seq: u64,
    last_ticket_at: Option<DateTime<Utc>>,
    manual: Option<ManualRefresh>,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::Sender<Completion>,
    completions: mpsc::Receiver<Completion>,
    cancel: CancellationToken,
}

impl PollScheduler {
    pub fn new(
        registrations: Vec<SourceRegistration>,
        active_tab: Tab,
        timeframe: Timeframe,
    ) -> (Self, SchedulerHandle) {
        let ids: Vec<SourceId> = registrations.iter().map(|r| r.descriptor.id).collect();
        let (aggregator, view) = Aggregator::new(ids, active_tab, timeframe);
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::channel(COMPLETION_BUFFER);
        let cancel = CancellationToken::new();

        let timelines = registrations
            .into_iter()
            .inspect(|r| {
                if r.adapter.source() != r.descriptor.id {
                    tracing::warn!(
                        "Adapter for {} registered under source {}",
                        r.adapter.source(),
                        r.descriptor.id
                    );
                }
            })
            .map(|r| SourceTimeline {
                descriptor: r.descriptor,
                adapter: r.adapter,
                phase: PollPhase::Idle,
                next_due: None,
                last_started: None,
                in_flight: None,
            })
            .collect();

        let scheduler = Self {
            timelines,
            aggregator,
            active_tab,
            timeframe,
            seq: 0,
            last_ticket_at: None,
            manual: None,
            commands,
            completions_tx,
            completions,
            cancel: cancel.clone(),
        };
        let handle = SchedulerHandle {
            commands: command_tx,
            view,
            cancel,
        };
        (scheduler, handle)
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Poll scheduler started with {} sources, active tab {}",
            self.timelines.len(),
            self.active_tab
        );
        for timeline in &self.timelines {
            let descriptor = &timeline.descriptor;
            tracing::debug!(
                "{} -> {} (schema v{}, foreground {:?}, background {:?})",
                descriptor.id,
                descriptor.endpoint,
                descriptor.schema_version,
                descriptor.foreground,
                descriptor.background
            );
        }
        let now = Instant::now();
        for index in 0..self.timelines.len() {
            if self.cadence(index).is_some() {
                self.start_poll(index, Trigger::Mount, now);
            }
        }

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(completion) = self.completions.recv() => self.on_completion(completion),
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                _ = sleep_until(deadline) => self.on_timer(Instant::now()),
            }
        }

        self.teardown();
    }

    fn cadence(&self, index: usize) -> Option<Duration> {
        self.timelines[index].descriptor.cadence_for(self.active_tab)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timelines.iter().filter_map(|t| t.next_due).min()
    }

    fn next_ticket(&mut self) -> PollTicket {
        // Never issue a ticket that sorts before an earlier one, even if the
        // wall clock steps backwards.
        let now = Utc::now();
        let started_at = self.last_ticket_at.map_or(now, |last| now.max(last));
        self.last_ticket_at = Some(started_at);
        self.seq += 1;
        PollTicket::new(started_at, self.seq)
    }

    /// Start a poll unless one is already outstanding for this source, in
    /// which case the request is coalesced and only the timer is reset.
    fn start_poll(&mut self, index: usize, trigger: Trigger, now: Instant) -> bool {
        let cadence = self.cadence(index);
        if self.timelines[index].in_flight.is_some() {
            let timeline = &mut self.timelines[index];
            timeline.next_due = cadence.map(|c| due_after(now, c));
            tracing::debug!(
                "{} poll coalesced ({:?}), next in {:?}",
                timeline.descriptor.id,
                trigger,
                cadence
            );
            return false;
        }

        let ticket = self.next_ticket();
        let token = self.cancel.child_token();
        let ctx = PollContext {
            timeframe: self.timeframe,
            cancel: token.clone(),
        };
        let tx = self.completions_tx.clone();
        let timeline = &mut self.timelines[index];
        let adapter = timeline.adapter.clone();
        let id = timeline.descriptor.id;

        tokio::spawn(async move {
            let result = adapter.fetch(&ctx).await;
            if ctx.cancel.is_cancelled() {
                return;
            }
            let _ = tx.send(Completion { index, ticket, result }).await;
        });

        tracing::debug!("{} {:?} -> Polling ({:?}, seq {})", id, timeline.phase, trigger, ticket.seq);
        timeline.in_flight = Some(InFlight {
            ticket,
            cancel: token,
        });
        timeline.phase = PollPhase::Polling;
        timeline.last_started = Some(now);
        timeline.next_due = cadence.map(|c| due_after(now, c));
        self.aggregator.mark_loading(id, ticket);
        true
    }

    fn on_completion(&mut self, completion: Completion) {
        let Some(timeline) = self.timelines.get_mut(completion.index) else {
            return;
        };
        let id = timeline.descriptor.id;
        let outstanding = timeline.in_flight.as_ref().map(|f| f.ticket);
        if outstanding != Some(completion.ticket) {
            tracing::debug!("Ignoring abandoned {} poll seq {}", id, completion.ticket.seq);
            return;
        }
        timeline.in_flight = None;
        timeline.phase = PollPhase::Idle;

        let result = match completion.result {
            Ok(fragment) => {
                tracing::debug!("{} Polling -> Success", id);
                Ok(fragment)
            }
            Err(FetchError::Cancelled) => {
                self.aggregator.clear_pending(id, completion.ticket);
                self.settle_manual(id);
                return;
            }
            Err(err) => {
                tracing::warn!("{} Polling -> Failed: {}", id, err);
                Err(SourceError::from(&err))
            }
        };
        self.aggregator.apply_update(id, result, completion.ticket);
        self.settle_manual(id);
    }

    fn on_timer(&mut self, now: Instant) {
        for index in 0..self.timelines.len() {
            let due = self.timelines[index].next_due.is_some_and(|d| d <= now);
            if due {
                self.start_poll(index, Trigger::Timer, now);
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Refresh(done) => self.manual_refresh(done, now),
            Command::ActivateTab(tab) => self.activate_tab(tab, now),
            Command::SetTimeframe(timeframe) => self.change_timeframe(timeframe, now),
        }
    }

    fn manual_refresh(&mut self, done: oneshot::Sender<RefreshReport>, now: Instant) {
        let active: Vec<usize> = (0..self.timelines.len())
            .filter(|&i| self.cadence(i).is_some())
            .collect();
        for &index in &active {
            self.start_poll(index, Trigger::Manual, now);
        }
        let ids: BTreeSet<SourceId> = active
            .iter()
            .map(|&i| self.timelines[i].descriptor.id)
            .collect();

        match &mut self.manual {
            Some(refresh) => {
                refresh.sources.extend(ids.iter().copied());
                refresh.pending.extend(ids);
                refresh.waiters.push(done);
            }
            None if ids.is_empty() => {
                let _ = done.send(RefreshReport {
                    sources: Vec::new(),
                    elapsed: Duration::ZERO,
                });
            }
            None => {
                tracing::info!("Manual refresh of {} sources", ids.len());
                self.manual = Some(ManualRefresh {
                    started: now,
                    sources: ids.clone(),
                    pending: ids,
                    waiters: vec![done],
                });
                self.aggregator.set_refreshing(true);
            }
        }
    }

    fn settle_manual(&mut self, id: SourceId) {
        let finished = match &mut self.manual {
            Some(refresh) => {
                refresh.pending.remove(&id);
                refresh.pending.is_empty()
            }
            None => false,
        };
        if !finished {
            return;
        }
        if let Some(refresh) = self.manual.take() {
            let report = RefreshReport {
                sources: refresh.sources.into_iter().collect(),
                elapsed: refresh.started.elapsed(),
            };
            tracing::info!("Manual refresh finished in {:?}", report.elapsed);
            for waiter in refresh.waiters {
                let _ = waiter.send(report.clone());
            }
            self.aggregator.set_refreshing(false);
        }
    }

    /// Switch cadences right away: the next poll is due one new-cadence
    /// period after the last start, or immediately if that is already past.
    fn activate_tab(&mut self, tab: Tab, now: Instant) {
        if tab == self.active_tab {
            return;
        }
        tracing::info!("Active tab {} -> {}", self.active_tab, tab);
        self.active_tab = tab;
        self.aggregator.set_active_tab(tab);
        for index in 0..self.timelines.len() {
            let cadence = self.cadence(index);
            let timeline = &mut self.timelines[index];
            let last_started = timeline.last_started;
            timeline.next_due =
                cadence.map(|c| last_started.map_or(now, |started| due_after(started, c).max(now)));
            tracing::debug!(
                "{} rescheduled ({:?}, foreground: {}) every {:?}",
                timeline.descriptor.id,
                Trigger::TabChange,
                timeline.descriptor.is_foreground(tab),
                cadence
            );
        }
    }

    /// Timeframe-sensitive sources drop their outstanding poll (its data
    /// would be for the old window) and re-poll now.
    fn change_timeframe(&mut self, timeframe: Timeframe, now: Instant) {
        if timeframe == self.timeframe {
            return;
        }
        tracing::info!("Timeframe {} -> {}", self.timeframe, timeframe);
        self.timeframe = timeframe;
        self.aggregator.set_timeframe(timeframe);

        for index in 0..self.timelines.len() {
            if !self.timelines[index].descriptor.is_timeframe_sensitive() {
                continue;
            }
            let cadence = self.cadence(index);
            let timeline = &mut self.timelines[index];
            let id = timeline.descriptor.id;
            if let Some(abandoned) = timeline.in_flight.take() {
                abandoned.cancel.cancel();
                timeline.phase = PollPhase::Idle;
                self.aggregator.clear_pending(id, abandoned.ticket);
            }
            match cadence {
                Some(_) => {
                    self.start_poll(index, Trigger::Timeframe, now);
                }
                None => {
                    // Paused: poll as soon as a consuming view becomes active.
                    self.timelines[index].last_started = None;
                    self.settle_manual(id);
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.cancel.cancel();
        for timeline in &mut self.timelines {
            if let Some(abandoned) = timeline.in_flight.take() {
                abandoned.cancel.cancel();
            }
            tracing::debug!("{} {:?} -> Stopped", timeline.descriptor.id, timeline.phase);
            timeline.phase = PollPhase::Stopped;
            timeline.next_due = None;
        }
        self.manual = None;
        tracing::info!("Poll scheduler stopped at revision {}", self.aggregator.snapshot().revision);
    }
}

/// `start + cadence`, saturating at one maximum cadence for intervals too
/// large to represent.
fn due_after(start: Instant, cadence: Duration) -> Instant {
    start
        .checked_add(cadence)
        .unwrap_or_else(|| start + MAX_CADENCE)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::RetryPolicy;
    use crate::domain::view_model::SlotStatus;
    use crate::infrastructure::payload_mapper::{network_fragment, system_fragment};
    use crate::application::chart_transformer::{node_chart, ChartOptions};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter with a fixed latency and a script of outcomes (`None` = failure).
    /// Once the script runs out it keeps succeeding.
    struct ScriptedAdapter {
        id: SourceId,
        latency: Duration,
        script: Mutex<VecDeque<Option<f64>>>,
        calls: Mutex<Vec<(Instant, Timeframe)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(id: SourceId, latency: Duration, script: Vec<Option<f64>>) -> Arc<Self> {
            Arc::new(Self {
                id,
                latency,
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        fn fragment(&self, value: f64, timeframe: Timeframe) -> Fragment {
            match self.id {
                SourceId::Network => Fragment::Network(network_fragment(
                    &json!({"traffic": {"bytes_sent": value}}),
                )),
                SourceId::NodeMetrics => Fragment::NodeMetrics(node_chart(
                    &[json!({"time": 1_700_000_000, "cpu": value})],
                    timeframe,
                    &ChartOptions::default(),
                )),
                _ => Fragment::System(system_fragment(&json!({"cpu_usage": value}))),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn source(&self) -> SourceId {
            self.id
        }

        async fn fetch(&self, ctx: &PollContext) -> Result<Fragment, FetchError> {
            self.calls.lock().unwrap().push((Instant::now(), ctx.timeframe));
            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

            let cancelled = tokio::select! {
                _ = ctx.cancel.cancelled() => true,
                _ = tokio::time::sleep(self.latency) => false,
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if cancelled {
                return Err(FetchError::Cancelled);
            }

            let step = self.script.lock().unwrap().pop_front().unwrap_or(Some(1.0));
            match step {
                Some(value) => Ok(self.fragment(value, ctx.timeframe)),
                None => Err(FetchError::SourceUnavailable {
                    endpoint: format!("/api/{}", self.id),
                    attempts: 3,
                    last: Box::new(FetchError::Transport {
                        endpoint: format!("/api/{}", self.id),
                        reason: "connection refused".to_string(),
                    }),
                }),
            }
        }
    }

    fn descriptor(id: SourceId, views: Vec<Tab>, fg: u64, bg: Option<u64>) -> SourceDescriptor {
        let endpoint = match id {
            SourceId::NodeMetrics => "/api/node/metrics?timeframe=${timeframe}".to_string(),
            other => format!("/api/{}", other),
        };
        SourceDescriptor {
            id,
            endpoint,
            companion_endpoint: None,
            views,
            foreground: Duration::from_secs(fg),
            background: bg.map(Duration::from_secs),
            retry: RetryPolicy::single_attempt(),
            schema_version: 1,
        }
    }

    fn register(descriptor: SourceDescriptor, adapter: &Arc<ScriptedAdapter>) -> SourceRegistration {
        let adapter: Arc<dyn SourceAdapter> = adapter.clone();
        SourceRegistration::new(descriptor, adapter)
    }

    async fn wait_for(
        rx: &mut watch::Receiver<Arc<ViewModel>>,
        pred: impl Fn(&ViewModel) -> bool,
    ) -> Arc<ViewModel> {
        loop {
            {
                let view = rx.borrow_and_update();
                if pred(&view) {
                    return view.clone();
                }
            }
            tokio::time::timeout(Duration::from_secs(600), rx.changed())
                .await
                .expect("view model never reached the expected state")
                .expect("scheduler dropped the view model");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_polls_every_active_source() {
        let system = ScriptedAdapter::new(SourceId::System, Duration::from_millis(200), vec![Some(12.0)]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::System, vec![Tab::Overview], 9, Some(60)), &system)],
            Tab::Overview,
            Timeframe::Day,
        );
        let mut rx = handle.subscribe();
        tokio::spawn(scheduler.run());

        let view = wait_for(&mut rx, |v| v.system.status == SlotStatus::Fresh).await;
        assert_eq!(view.system.value.as_ref().unwrap().cpu_usage, 12.0);
        assert!(!view.system.loading);
        assert_eq!(system.call_count(), 1);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_coalesces_with_outstanding_poll() {
        let start = Instant::now();
        let system = ScriptedAdapter::new(SourceId::System, Duration::from_secs(5), vec![]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::System, vec![Tab::Overview], 9, Some(60)), &system)],
            Tab::Overview,
            Timeframe::Day,
        );
        tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let report = handle.refresh().await.unwrap();

        assert_eq!(report.sources, vec![SourceId::System]);
        assert_eq!(system.call_count(), 1);
        assert_eq!(system.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!handle.snapshot().refreshing);

        // Timer was reset by the refresh at t=1: next poll at t=10, not t=9.
        tokio::time::sleep_until(start + Duration::from_millis(9500)).await;
        assert_eq!(system.call_count(), 1);
        tokio::time::sleep_until(start + Duration::from_millis(10500)).await;
        assert_eq!(system.call_count(), 2);
        let second = system.call_times()[1] - start;
        assert!(second >= Duration::from_secs(10) && second < Duration::from_millis(10500));
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_marks_view_while_outstanding() {
        let system = ScriptedAdapter::new(SourceId::System, Duration::from_secs(2), vec![]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::System, vec![Tab::Overview], 30, Some(60)), &system)],
            Tab::Overview,
            Timeframe::Day,
        );
        let mut rx = handle.subscribe();
        tokio::spawn(scheduler.run());
        wait_for(&mut rx, |v| v.system.status == SlotStatus::Fresh).await;

        let background = handle.clone();
        let refresh = tokio::spawn(async move { background.refresh().await });
        wait_for(&mut rx, |v| v.refreshing && v.system.loading).await;
        let report = refresh.await.unwrap().unwrap();
        assert_eq!(report.elapsed, Duration::from_secs(2));
        wait_for(&mut rx, |v| !v.refreshing && !v.system.loading).await;
        assert_eq!(system.call_count(), 2);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_keeps_last_good_value() {
        let system = ScriptedAdapter::new(SourceId::System, Duration::ZERO, vec![Some(10.0), None]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::System, vec![Tab::Overview], 9, Some(60)), &system)],
            Tab::Overview,
            Timeframe::Day,
        );
        let mut rx = handle.subscribe();
        tokio::spawn(scheduler.run());

        let view = wait_for(&mut rx, |v| v.system.status == SlotStatus::Stale).await;
        assert_eq!(view.system.value.as_ref().unwrap().cpu_usage, 10.0);
        let error = view.system.last_error.as_ref().unwrap();
        assert_eq!(error.kind, crate::error::ErrorKind::SourceUnavailable);

        // Recovery clears the error.
        let view = wait_for(&mut rx, |v| v.system.status == SlotStatus::Fresh && v.system.last_error.is_none()).await;
        assert_eq!(view.system.value.as_ref().unwrap().cpu_usage, 1.0);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_source_does_not_block_others() {
        let system = ScriptedAdapter::new(SourceId::System, Duration::ZERO, vec![Some(3.0), None, None, None]);
        let network = ScriptedAdapter::new(SourceId::Network, Duration::from_secs(1), vec![Some(100.0), Some(200.0)]);
        let (scheduler, handle) = PollScheduler::new(
            vec![
                register(descriptor(SourceId::System, vec![Tab::Overview], 9, Some(60)), &system),
                register(descriptor(SourceId::Network, vec![Tab::Overview], 9, Some(60)), &network),
            ],
            Tab::Overview,
            Timeframe::Day,
        );
        let mut rx = handle.subscribe();
        tokio::spawn(scheduler.run());

        let view = wait_for(&mut rx, |v| {
            v.system.status == SlotStatus::Stale
                && v.network.value.as_ref().is_some_and(|n| n.traffic.bytes_sent == 200.0)
        })
        .await;
        assert_eq!(view.system.value.as_ref().unwrap().cpu_usage, 3.0);
        assert!(view.system.last_error.is_some());
        assert!(view.network.last_error.is_none());
        assert_eq!(view.network.status, SlotStatus::Fresh);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_switch_applies_new_cadence_immediately() {
        let start = Instant::now();
        let system = ScriptedAdapter::new(SourceId::System, Duration::ZERO, vec![]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::System, vec![Tab::Overview], 9, Some(60)), &system)],
            Tab::Overview,
            Timeframe::Day,
        );
        tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.activate_tab(Tab::Storage).await.unwrap();

        // Under the old 9 s cadence there would have been three more polls by now.
        tokio::time::sleep_until(start + Duration::from_secs(30)).await;
        assert_eq!(system.call_count(), 1);

        tokio::time::sleep_until(start + Duration::from_millis(60500)).await;
        assert_eq!(system.call_count(), 2);
        assert_eq!(system.call_times()[1] - start, Duration::from_secs(60));

        // Back to the foreground: due 9 s after the last start.
        tokio::time::sleep_until(start + Duration::from_secs(65)).await;
        handle.activate_tab(Tab::Overview).await.unwrap();
        tokio::time::sleep_until(start + Duration::from_millis(69500)).await;
        assert_eq!(system.call_count(), 3);
        assert_eq!(system.call_times()[2] - start, Duration::from_secs(69));
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_source_waits_for_its_view() {
        let series = ScriptedAdapter::new(SourceId::NodeMetrics, Duration::ZERO, vec![]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::NodeMetrics, vec![Tab::Overview], 60, None), &series)],
            Tab::Logs,
            Timeframe::Day,
        );
        let mut rx = handle.subscribe();
        tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(series.call_count(), 0);
        assert_eq!(handle.snapshot().node_metrics.status, SlotStatus::Loading);
        let report = handle.refresh().await.unwrap();
        assert!(report.sources.is_empty());

        handle.activate_tab(Tab::Overview).await.unwrap();
        wait_for(&mut rx, |v| v.node_metrics.status == SlotStatus::Fresh).await;
        assert_eq!(series.call_count(), 1);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeframe_change_supersedes_outstanding_poll() {
        let series = ScriptedAdapter::new(SourceId::NodeMetrics, Duration::from_secs(5), vec![Some(0.5), Some(0.25)]);
        let system = ScriptedAdapter::new(SourceId::System, Duration::from_secs(5), vec![]);
        let (scheduler, handle) = PollScheduler::new(
            vec![
                register(descriptor(SourceId::NodeMetrics, vec![Tab::Overview], 60, None), &series),
                register(descriptor(SourceId::System, vec![Tab::Overview], 60, None), &system),
            ],
            Tab::Overview,
            Timeframe::Day,
        );
        let mut rx = handle.subscribe();
        tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.set_timeframe(Timeframe::Week).await.unwrap();

        let view = wait_for(&mut rx, |v| v.node_metrics.status == SlotStatus::Fresh).await;
        let chart = view.node_metrics.value.as_ref().unwrap();
        assert_eq!(chart.timeframe, Timeframe::Week);
        assert_eq!(view.timeframe, Timeframe::Week);
        let timeframes: Vec<Timeframe> = series.calls.lock().unwrap().iter().map(|(_, t)| *t).collect();
        assert_eq!(timeframes, vec![Timeframe::Day, Timeframe::Week]);
        // The abandoned day poll never produced a value.
        assert_eq!(chart.points[0].cpu, 50.0);
        // Timeframe-insensitive sources are left alone.
        assert_eq!(system.call_count(), 1);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_tick_during_outstanding_poll_is_coalesced() {
        let start = Instant::now();
        let system = ScriptedAdapter::new(SourceId::System, Duration::from_secs(20), vec![]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::System, vec![Tab::Overview], 9, Some(60)), &system)],
            Tab::Overview,
            Timeframe::Day,
        );
        tokio::spawn(scheduler.run());

        tokio::time::sleep_until(start + Duration::from_secs(100)).await;

        // Ticks at 9 and 18 land on the poll started at 0 and only push the
        // timer, so the next request goes out at 27.
        let offsets: Vec<u64> = system.call_times().iter().map(|t| (*t - start).as_secs()).collect();
        assert_eq!(offsets, vec![0, 27, 54, 81]);
        assert_eq!(system.max_in_flight.load(Ordering::SeqCst), 1);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_cadence_does_not_stop_scheduler() {
        let system = ScriptedAdapter::new(SourceId::System, Duration::from_millis(200), vec![Some(3.0)]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::System, vec![Tab::Overview], u64::MAX, Some(u64::MAX)), &system)],
            Tab::Overview,
            Timeframe::Day,
        );
        let mut rx = handle.subscribe();
        let task = tokio::spawn(scheduler.run());

        let view = wait_for(&mut rx, |v| v.system.status == SlotStatus::Fresh).await;
        assert_eq!(view.system.value.as_ref().unwrap().cpu_usage, 3.0);

        let report = handle.refresh().await.unwrap();
        assert_eq!(report.sources, vec![SourceId::System]);
        handle.activate_tab(Tab::Storage).await.unwrap();
        handle.activate_tab(Tab::Overview).await.unwrap();
        assert_eq!(system.call_count(), 2);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_after_saturates() {
        let now = Instant::now();
        assert_eq!(due_after(now, Duration::from_secs(9)), now + Duration::from_secs(9));
        assert_eq!(due_after(now, Duration::MAX), now + MAX_CADENCE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_timers_and_in_flight_polls() {
        let system = ScriptedAdapter::new(SourceId::System, Duration::from_secs(5), vec![]);
        let (scheduler, handle) = PollScheduler::new(
            vec![register(descriptor(SourceId::System, vec![Tab::Overview], 9, Some(60)), &system)],
            Tab::Overview,
            Timeframe::Day,
        );
        let task = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(system.call_count(), 1);
        assert_eq!(system.in_flight.load(Ordering::SeqCst), 0);
        let view = handle.snapshot();
        assert!(view.system.value.is_none());
        assert_eq!(handle.refresh().await, Err(SchedulerError::Stopped));
    }
}
