//! Change monitor: mutation bursts and periodic ticks become scan requests.
//!
//! ```text
//! MutationEvent ──► CoalescingQueue (trailing debounce) ──┐
//!                                                          ├──► ScanRequest ──► ScanSink
//! periodic tick ──► ScheduledTask ─────────────────────────┘
//! ```
//!
//! At most one scan runs at a time. Requests that come due while a scan is
//! in flight stay queued until [`ChangeMonitor::complete`] is called.

pub mod scheduler;

pub use scheduler::{Batch, CoalescingQueue, ScheduledTask};

use crate::collect::ScanScope;
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use umbra_common::NodeId;
use umbra_config::MonitorPolicy;

/// A host mutation notification. `scope: None` means "somewhere".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationEvent {
    pub scope: Option<NodeId>,
}

impl MutationEvent {
    pub fn at(node: NodeId) -> Self {
        Self { scope: Some(node) }
    }

    pub fn unscoped() -> Self {
        Self { scope: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Mutation,
    Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub scope: ScanScope,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub mutations: usize,
    pub scans: usize,
    pub ticks: usize,
}

#[derive(Debug)]
pub struct ChangeMonitor {
    queue: CoalescingQueue<NodeId>,
    tick: ScheduledTask,
    tick_interval: Duration,
    in_flight: bool,
    stats: MonitorStats,
}

impl ChangeMonitor {
    /// Ticks start counting from `now`. A zero interval disables ticks.
    pub fn new(debounce: Duration, tick_interval: Duration, now: Instant) -> Self {
        let mut tick = ScheduledTask::new();
        if !tick_interval.is_zero() {
            tick.schedule_after(now, tick_interval);
        }
        Self {
            queue: CoalescingQueue::new(debounce),
            tick,
            tick_interval,
            in_flight: false,
            stats: MonitorStats::default(),
        }
    }

    pub fn from_policy(policy: &MonitorPolicy, now: Instant) -> Self {
        Self::new(policy.debounce(), policy.tick(), now)
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn notify(&mut self, now: Instant, event: MutationEvent) {
        self.stats.mutations += 1;
        self.queue.push(now, event.scope);
    }

    /// The scan to run now, if any. Marks the monitor in flight.
    pub fn poll(&mut self, now: Instant) -> Option<ScanRequest> {
        if self.in_flight {
            return None;
        }
        if let Some(batch) = self.queue.poll(now) {
            return Some(self.start(batch_scope(batch), Trigger::Mutation));
        }
        if self.tick.fire(now) {
            self.tick.schedule_after(now, self.tick_interval);
            self.stats.ticks += 1;
            return Some(self.start(ScanScope::Full, Trigger::Tick));
        }
        None
    }

    /// Release pending mutations immediately, e.g. when the source closes.
    pub fn flush(&mut self) -> Option<ScanRequest> {
        if self.in_flight {
            return None;
        }
        let batch = self.queue.flush()?;
        Some(self.start(batch_scope(batch), Trigger::Mutation))
    }

    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    /// Earliest instant at which [`ChangeMonitor::poll`] may return a request.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.queue.deadline(), self.tick.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn start(&mut self, scope: ScanScope, trigger: Trigger) -> ScanRequest {
        self.in_flight = true;
        self.stats.scans += 1;
        debug!(trigger = ?trigger, full = matches!(scope, ScanScope::Full), "scan requested");
        ScanRequest { scope, trigger }
    }
}

fn batch_scope(batch: Batch<NodeId>) -> ScanScope {
    match batch {
        Batch::Full => ScanScope::Full,
        Batch::Items(nodes) => ScanScope::Nodes(nodes),
    }
}

/// Receiver of scan requests. Each call completes before the next starts.
#[async_trait(?Send)]
pub trait ScanSink {
    async fn scan(&mut self, request: ScanRequest);
}

/// Drive `monitor` until `shutdown` flips to `true` or every event sender
/// is dropped. A closed event channel flushes pending mutations first.
pub async fn run_monitor(
    mut monitor: ChangeMonitor,
    mut events: mpsc::Receiver<MutationEvent>,
    mut shutdown: watch::Receiver<bool>,
    sink: &mut dyn ScanSink,
) -> MonitorStats {
    loop {
        let deadline = monitor.next_deadline().map(tokio::time::Instant::from_std);
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            maybe = events.recv() => {
                match maybe {
                    Some(event) => monitor.notify(now(), event),
                    None => {
                        if let Some(request) = monitor.flush() {
                            sink.scan(request).await;
                            monitor.complete();
                        }
                        break;
                    }
                }
            }
            _ = sleep_until(deadline), if deadline.is_some() => {
                if let Some(request) = monitor.poll(now()) {
                    sink.scan(request).await;
                    monitor.complete();
                }
            }
        }
    }
    let stats = monitor.stats();
    info!(mutations = stats.mutations, scans = stats.scans, ticks = stats.ticks, "monitor stopped");
    stats
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    if let Some(at) = deadline {
        tokio::time::sleep_until(at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(500);
    const TICK: Duration = Duration::from_secs(5);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_of_fifty_mutations_yields_one_scan() {
        let t0 = Instant::now();
        let mut m = ChangeMonitor::new(DEBOUNCE, TICK, t0);
        for i in 0..50u64 {
            m.notify(t0 + ms(i * 5), MutationEvent::at(NodeId(i % 7)));
            assert_eq!(m.poll(t0 + ms(i * 5)), None);
        }
        let last = t0 + ms(49 * 5);
        assert_eq!(m.poll(last + ms(499)), None);
        let req = m.poll(last + DEBOUNCE).unwrap();
        assert_eq!(req.trigger, Trigger::Mutation);
        assert!(matches!(req.scope, ScanScope::Nodes(ref n) if n.len() == 7));
        m.complete();
        assert_eq!(m.poll(last + ms(1000)), None);
        assert_eq!(m.stats().scans, 1);
        assert_eq!(m.stats().mutations, 50);
    }

    #[test]
    fn unscoped_mutation_requests_full_scan() {
        let t0 = Instant::now();
        let mut m = ChangeMonitor::new(DEBOUNCE, TICK, t0);
        m.notify(t0, MutationEvent::at(NodeId(3)));
        m.notify(t0, MutationEvent::unscoped());
        assert_eq!(m.poll(t0 + DEBOUNCE).unwrap().scope, ScanScope::Full);
    }

    #[test]
    fn tick_fires_periodically() {
        let t0 = Instant::now();
        let mut m = ChangeMonitor::new(DEBOUNCE, TICK, t0);
        assert_eq!(m.next_deadline(), Some(t0 + TICK));
        let req = m.poll(t0 + TICK).unwrap();
        assert_eq!(req, ScanRequest { scope: ScanScope::Full, trigger: Trigger::Tick });
        m.complete();
        assert_eq!(m.poll(t0 + TICK + ms(1)), None);
        assert!(m.poll(t0 + TICK * 2).is_some());
    }

    #[test]
    fn zero_tick_interval_never_ticks() {
        let t0 = Instant::now();
        let mut m = ChangeMonitor::new(DEBOUNCE, Duration::ZERO, t0);
        assert_eq!(m.next_deadline(), None);
        for _ in 0..5 {
            assert_eq!(m.poll(t0), None);
            m.complete();
        }
        assert_eq!(m.poll(t0 + TICK * 10), None);
        assert_eq!(m.stats().ticks, 0);

        m.notify(t0, MutationEvent::at(NodeId(1)));
        assert_eq!(m.poll(t0 + DEBOUNCE).unwrap().trigger, Trigger::Mutation);
    }

    #[test]
    fn requests_wait_while_a_scan_is_in_flight() {
        let t0 = Instant::now();
        let mut m = ChangeMonitor::new(DEBOUNCE, TICK, t0);
        m.notify(t0, MutationEvent::at(NodeId(1)));
        let _first = m.poll(t0 + DEBOUNCE).unwrap();
        m.notify(t0 + DEBOUNCE, MutationEvent::at(NodeId(2)));
        assert_eq!(m.poll(t0 + DEBOUNCE * 3), None, "not reentrant");
        m.complete();
        let second = m.poll(t0 + DEBOUNCE * 3).unwrap();
        assert_eq!(second.scope, ScanScope::Nodes([NodeId(2)].into_iter().collect()));
    }

    struct Recorder(Vec<ScanRequest>);

    #[async_trait(?Send)]
    impl ScanSink for Recorder {
        async fn scan(&mut self, request: ScanRequest) {
            self.0.push(request);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn driver_coalesces_a_burst_and_stops_on_shutdown() {
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = ChangeMonitor::new(DEBOUNCE, TICK, now());
        let mut sink = Recorder(Vec::new());

        let producer = async move {
            for i in 0..50u64 {
                tx.send(MutationEvent::at(NodeId(i))).await.unwrap();
                tokio::time::sleep(ms(2)).await;
            }
            tokio::time::sleep(ms(2000)).await;
            stop_tx.send(true).unwrap();
            tx
        };
        let (stats, _tx) = {
            let driver = run_monitor(monitor, rx, stop_rx, &mut sink);
            let (stats, tx) = tokio::join!(driver, producer);
            (stats, tx)
        };

        assert_eq!(stats.mutations, 50);
        assert_eq!(stats.scans, 1);
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].trigger, Trigger::Mutation);
    }
}
