//! Periodic event generators — ambient news, mood drift, and cross-agent
//! interaction prompts, each on its own interval.
//!
//! Every loop checks the shared running flag on each wake, so `stop()`
//! terminates all of them within one interval; the handles are also aborted
//! and joined so nothing outlives the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::json;
use tokio::task::JoinHandle;

use troupe_core::config::EventIntervals;
use troupe_core::types::{Event, kinds};

use crate::bus::EventBus;
use crate::scheduler::AgentScheduler;

/// Ambient headlines sampled by the news generator.
const AMBIENT_HEADLINES: &[&str] = &[
    "Breaking: new AI breakthrough in natural language processing",
    "Tech giants announce collaboration on open-source AI",
    "Cryptocurrency market sees significant movement",
    "Social media platforms update their algorithms",
    "Scientists discover new applications for blockchain technology",
    "Startup raises millions in funding for AI-powered solution",
    "Government announces new regulations for digital platforms",
    "Major tech conference announces groundbreaking speakers",
    "Open source community releases revolutionary new tool",
    "Industry experts predict major shifts in technology landscape",
];

/// Maximum per-component magnitude of a generated mood drift.
const MOOD_DRIFT: f64 = 0.2;

/// The three generator loops and their shared running flag.
pub struct EventGenerators {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl EventGenerators {
    /// Spawn all three loops.
    pub fn start(
        bus: Arc<EventBus>,
        scheduler: Arc<AgentScheduler>,
        intervals: &EventIntervals,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let handles = vec![
            tokio::spawn(news_loop(
                bus.clone(),
                running.clone(),
                Duration::from_secs(intervals.news_interval_secs.max(1)),
            )),
            tokio::spawn(mood_loop(
                bus.clone(),
                scheduler.clone(),
                running.clone(),
                Duration::from_secs(intervals.mood_interval_secs.max(1)),
            )),
            tokio::spawn(interaction_loop(
                bus,
                scheduler,
                running.clone(),
                Duration::from_secs(intervals.interaction_interval_secs.max(1)),
            )),
        ];
        tracing::info!("⏰ Periodic event generators started");
        Self { running, handles }
    }

    /// Flip the running flag and cancel every loop, awaiting each handle.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        tracing::info!("⏰ Periodic event generators stopped");
    }
}

async fn news_loop(bus: Arc<EventBus>, running: Arc<AtomicBool>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await; // the first tick completes immediately
    loop {
        interval.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let headline = {
            let mut rng = rand::thread_rng();
            AMBIENT_HEADLINES.choose(&mut rng).copied().unwrap_or_default()
        };
        bus.queue(Event::new(kinds::NEWS).with_payload(json!({ "headline": headline })));
    }
}

async fn mood_loop(
    bus: Arc<EventBus>,
    scheduler: Arc<AgentScheduler>,
    running: Arc<AtomicBool>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let ids = scheduler.agent_ids(true).await;
        let mut rng = rand::thread_rng();
        for agent_id in ids {
            let payload = json!({
                "valence": rng.gen_range(-MOOD_DRIFT..=MOOD_DRIFT),
                "arousal": rng.gen_range(-MOOD_DRIFT..=MOOD_DRIFT),
                "dominance": rng.gen_range(-MOOD_DRIFT..=MOOD_DRIFT),
            });
            bus.queue(
                Event::new(kinds::MOOD)
                    .for_agent(&agent_id)
                    .with_payload(payload),
            );
        }
    }
}

async fn interaction_loop(
    bus: Arc<EventBus>,
    scheduler: Arc<AgentScheduler>,
    running: Arc<AtomicBool>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let ids = scheduler.agent_ids(true).await;
        if ids.len() < 2 {
            continue;
        }
        let pair: Vec<&String> = {
            let mut rng = rand::thread_rng();
            ids.choose_multiple(&mut rng, 2).collect()
        };
        bus.queue(
            Event::new(kinds::INTERACTION)
                .for_agent(pair[0])
                .with_payload(json!({ "target": pair[1] })),
        );
    }
}
