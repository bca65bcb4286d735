//! Event bus — priority-tiered dispatch with delayed-event promotion.
//!
//! Two background loops: the dispatch loop pops the highest-priority live
//! event (FIFO within a tier) and invokes every subscribed listener for its
//! kind concurrently, waiting for all of them before recording history and
//! moving on; the promotion loop moves pending events whose due time has
//! arrived into the live queue on a fixed poll interval.
//!
//! The bus is the failure-isolation boundary: a listener error is logged and
//! never stops sibling listeners or the loop itself.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use troupe_core::Result;
use troupe_core::config::BusConfig;
use troupe_core::types::{Event, EventPriority};

use crate::clock::Clock;

/// How long the dispatch loop dozes when the queue is empty and no wakeup
/// arrives. Keeps `stop()` responsive without busy-waiting.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// A boxed async event listener.
pub type Listener = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Live-queue entry ordered by (priority desc, enqueue sequence asc).
struct QueuedEvent {
    priority: EventPriority,
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueuedEvent {}
impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher tier wins; within a tier, the earlier sequence.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct BusInner {
    live: BinaryHeap<QueuedEvent>,
    pending: Vec<Event>,
    seq: u64,
    history: VecDeque<Event>,
}

impl BusInner {
    fn push_live(&mut self, event: Event) {
        self.seq += 1;
        self.live.push(QueuedEvent {
            priority: event.priority,
            seq: self.seq,
            event,
        });
    }
}

/// The event bus.
pub struct EventBus {
    inner: Mutex<BusInner>,
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    wake: Notify,
    running: AtomicBool,
    promotion_interval: Duration,
    history_cap: usize,
    clock: Clock,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    promotion_task: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Create a stopped bus. Call [`EventBus::start`] to begin dispatching.
    pub fn new(config: &BusConfig, clock: Clock) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                live: BinaryHeap::new(),
                pending: Vec::new(),
                seq: 0,
                history: VecDeque::new(),
            }),
            listeners: RwLock::new(HashMap::new()),
            wake: Notify::new(),
            running: AtomicBool::new(false),
            promotion_interval: Duration::from_secs(config.promotion_interval_secs.max(1)),
            history_cap: config.history_cap,
            clock,
            dispatch_task: Mutex::new(None),
            promotion_task: Mutex::new(None),
        }
    }

    /// Register a listener for an event kind. Multiple listeners per kind
    /// are allowed and all are invoked.
    pub fn subscribe<F, Fut>(&self, kind: &str, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: Listener = Arc::new(move |event| -> BoxFuture<'static, Result<()>> {
            Box::pin(handler(event))
        });
        self.listeners
            .write()
            .unwrap()
            .entry(kind.to_string())
            .or_default()
            .push(boxed);
    }

    /// Append an event to the live queue. Never blocks. An event carrying a
    /// still-future `scheduled_for` is routed to the pending set instead —
    /// the live queue never holds a not-yet-due event.
    pub fn queue(&self, event: Event) {
        self.route(event);
    }

    /// Place a delayed event in the pending set until its due time. An
    /// already-due event goes straight to the live queue.
    pub fn schedule(&self, event: Event) {
        self.route(event);
    }

    fn route(&self, event: Event) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();
        match event.scheduled_for {
            Some(at) if at > now => {
                tracing::debug!("🕐 Event '{}' pending until {}", event.kind, at);
                inner.pending.push(event);
            }
            _ => {
                inner.push_live(event);
                drop(inner);
                self.wake.notify_one();
            }
        }
    }

    /// Move every due pending event into the live queue. Returns how many
    /// were promoted. The promotion loop calls this on its poll interval.
    pub fn promote_due(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();
        let mut promoted = 0;
        let mut i = 0;
        while i < inner.pending.len() {
            if inner.pending[i].scheduled_for.is_none_or(|at| at <= now) {
                let event = inner.pending.swap_remove(i);
                inner.push_live(event);
                promoted += 1;
            } else {
                i += 1;
            }
        }
        drop(inner);
        if promoted > 0 {
            tracing::debug!("⏫ Promoted {promoted} scheduled event(s)");
            self.wake.notify_one();
        }
        promoted
    }

    /// Start the dispatch and promotion loops. Idempotent.
    pub fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let bus = self.clone();
        *self.dispatch_task.lock().unwrap() = Some(tokio::spawn(bus.dispatch_loop()));
        let bus = self.clone();
        *self.promotion_task.lock().unwrap() = Some(tokio::spawn(bus.promotion_loop()));
        tracing::info!("📬 Event bus started");
    }

    /// Stop both loops. In-flight listener invocations for the event being
    /// dispatched are allowed to finish; no further event begins dispatch
    /// once this returns.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.wake.notify_waiters();
        let promotion = self.promotion_task.lock().unwrap().take();
        if let Some(handle) = promotion {
            handle.abort();
            let _ = handle.await;
        }
        let dispatch = self.dispatch_task.lock().unwrap().take();
        if let Some(handle) = dispatch {
            let _ = handle.await;
        }
        tracing::info!("📭 Event bus stopped");
    }

    async fn dispatch_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let next = self.inner.lock().unwrap().live.pop();
            match next {
                Some(queued) => self.dispatch_one(queued.event).await,
                None => {
                    // Doze until queued/promoted work or stop() wakes us.
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(IDLE_WAIT) => {}
                    }
                }
            }
        }
    }

    async fn promotion_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.promotion_interval);
        interval.tick().await;
        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            self.promote_due();
        }
    }

    /// Invoke every listener for the event concurrently, await them all,
    /// then record the event to the capped history.
    async fn dispatch_one(&self, event: Event) {
        let listeners = self
            .listeners
            .read()
            .unwrap()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        if !listeners.is_empty() {
            let invocations = listeners.iter().map(|listener| listener(event.clone()));
            let results = futures::future::join_all(invocations).await;
            for (i, result) in results.into_iter().enumerate() {
                if let Err(e) = result {
                    tracing::warn!("⚠️ Listener #{i} for '{}' failed: {e}", event.kind);
                }
            }
        }

        let mut inner = self.inner.lock().unwrap();
        inner.history.push_back(event);
        while inner.history.len() > self.history_cap {
            inner.history.pop_front();
        }
    }

    /// Snapshot of the dispatch history, oldest first.
    pub fn history(&self) -> Vec<Event> {
        self.inner.lock().unwrap().history.iter().cloned().collect()
    }

    /// Number of events awaiting dispatch.
    pub fn live_len(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    /// Number of events waiting on their due time.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use troupe_core::types::kinds;

    fn test_bus(clock: Clock) -> Arc<EventBus> {
        Arc::new(EventBus::new(&BusConfig::default(), clock))
    }

    fn recorder(bus: &EventBus, kind: &str) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(kind, move |event: Event| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event.id.clone());
                Ok(())
            }
        });
        seen
    }

    #[tokio::test]
    async fn test_priority_tiers_drain_highest_first() {
        let bus = test_bus(Clock::system());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe("t", move |event: Event| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event.priority);
                Ok(())
            }
        });

        // Queue in scrambled order before the loops run.
        bus.queue(Event::new("t").with_priority(EventPriority::Low));
        bus.queue(Event::new("t").with_priority(EventPriority::Critical));
        bus.queue(Event::new("t").with_priority(EventPriority::Normal));
        bus.queue(Event::new("t").with_priority(EventPriority::High));
        bus.queue(Event::new("t").with_priority(EventPriority::Critical));

        bus.clone().start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.stop().await;

        let order = seen.lock().unwrap().clone();
        assert_eq!(
            order,
            vec![
                EventPriority::Critical,
                EventPriority::Critical,
                EventPriority::High,
                EventPriority::Normal,
                EventPriority::Low,
            ]
        );
    }

    #[tokio::test]
    async fn test_fifo_within_tier() {
        let bus = test_bus(Clock::system());
        let seen = recorder(&bus, "t");

        let events: Vec<Event> = (0..5).map(|_| Event::new("t")).collect();
        let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
        for event in events {
            bus.queue(event);
        }

        bus.clone().start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.stop().await;

        assert_eq!(*seen.lock().unwrap(), ids);
    }

    #[tokio::test]
    async fn test_future_event_never_live_until_due() {
        let clock = Clock::manual(Utc::now());
        let bus = test_bus(clock.clone());

        let due = clock.now() + chrono::Duration::minutes(5);
        bus.queue(Event::new(kinds::AGENT_POST).at(due));
        assert_eq!(bus.live_len(), 0);
        assert_eq!(bus.pending_len(), 1);

        assert_eq!(bus.promote_due(), 0);
        clock.advance(chrono::Duration::minutes(6));
        assert_eq!(bus.promote_due(), 1);
        assert_eq!(bus.live_len(), 1);
        assert_eq!(bus.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_schedule_already_due_goes_live() {
        let clock = Clock::manual(Utc::now());
        let bus = test_bus(clock.clone());
        bus.schedule(Event::new("t").at(clock.now() - chrono::Duration::seconds(1)));
        assert_eq!(bus.live_len(), 1);
        assert_eq!(bus.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_listener_error_does_not_stop_siblings_or_loop() {
        let bus = test_bus(Clock::system());
        bus.subscribe("t", |_event: Event| async {
            Err(troupe_core::TroupeError::Other("listener exploded".into()))
        });
        let seen = recorder(&bus, "t");

        bus.queue(Event::new("t"));
        bus.queue(Event::new("t"));

        bus.clone().start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.stop().await;

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(bus.history().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_waits_for_inflight_listeners() {
        let bus = test_bus(Clock::system());
        let counter = Arc::new(Mutex::new(0));
        // Five slow listeners in flight for the same event.
        for _ in 0..5 {
            let counter = counter.clone();
            bus.subscribe("t", move |_event: Event| {
                let counter = counter.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    *counter.lock().unwrap() += 1;
                    Ok(())
                }
            });
        }

        bus.queue(Event::new("t"));
        bus.clone().start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.stop().await;

        // All five invocations finished before stop() returned.
        assert_eq!(*counter.lock().unwrap(), 5);

        // Nothing begins dispatch after stop.
        bus.queue(Event::new("t"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*counter.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let config = BusConfig {
            history_cap: 3,
            ..BusConfig::default()
        };
        let bus = Arc::new(EventBus::new(&config, Clock::system()));
        bus.clone().start();
        for _ in 0..10 {
            bus.queue(Event::new("t"));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.stop().await;
        assert_eq!(bus.history().len(), 3);
    }

    #[tokio::test]
    async fn test_promotion_loop_delivers_scheduled_event() {
        let config = BusConfig {
            promotion_interval_secs: 1,
            ..BusConfig::default()
        };
        let clock = Clock::manual(Utc::now());
        let bus = Arc::new(EventBus::new(&config, clock.clone()));
        let seen = recorder(&bus, "t");

        bus.schedule(Event::new("t").at(clock.now() + chrono::Duration::minutes(1)));
        bus.clone().start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(seen.lock().unwrap().is_empty());

        clock.advance(chrono::Duration::minutes(2));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        bus.stop().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
