//! Streaming poll loops — one cancelable task per active agent that polls
//! the feed for inbound interactions and routes unseen ones through the
//! scheduler.
//!
//! A transient fetch error never terminates a loop: it is logged and the
//! loop sleeps its normal interval before retrying.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::scheduler::AgentScheduler;

/// Per-agent inbound poll tasks.
pub struct StreamingPolls {
    running: Arc<AtomicBool>,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl StreamingPolls {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn one poll loop per active agent. Idempotent while running.
    pub async fn start(&self, scheduler: &Arc<AgentScheduler>, poll_interval: Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let agent_ids = scheduler.agent_ids(true).await;
        let count = agent_ids.len();
        let mut handles = self.handles.lock().unwrap();
        for agent_id in agent_ids {
            let handle = tokio::spawn(poll_loop(
                scheduler.clone(),
                agent_id.clone(),
                self.running.clone(),
                poll_interval,
            ));
            handles.insert(agent_id, handle);
        }
        tracing::info!("📡 Inbound polling started for {count} agent(s)");
    }

    /// Cancel every poll task and await each cancellation before returning.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let handles: Vec<(String, JoinHandle<()>)> =
            self.handles.lock().unwrap().drain().collect();
        for (agent_id, handle) in handles {
            handle.abort();
            let _ = handle.await;
            tracing::debug!("Poll loop for '{agent_id}' stopped");
        }
        tracing::info!("📡 Inbound polling stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for StreamingPolls {
    fn default() -> Self {
        Self::new()
    }
}

async fn poll_loop(
    scheduler: Arc<AgentScheduler>,
    agent_id: String,
    running: Arc<AtomicBool>,
    every: Duration,
) {
    while running.load(Ordering::SeqCst) {
        match scheduler.poll_inbound(&agent_id).await {
            Ok(fetched) if fetched > 0 => {
                tracing::debug!("Fetched {fetched} inbound interaction(s) for '{agent_id}'");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("⚠️ Inbound fetch failed for '{agent_id}': {e}");
            }
        }
        tokio::time::sleep(every).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::clock::Clock;
    use troupe_channels::SandboxFeed;
    use troupe_core::config::{AgentConfig, BusConfig};
    use troupe_core::types::{Behavior, Interaction};
    use troupe_memory::SqliteMemory;
    use troupe_providers::ScriptedProvider;

    async fn scheduler_with_agent(feed: Arc<SandboxFeed>) -> Arc<AgentScheduler> {
        let clock = Clock::system();
        let bus = Arc::new(EventBus::new(&BusConfig::default(), clock.clone()));
        let scheduler = Arc::new(AgentScheduler::new(
            bus,
            feed,
            Arc::new(SqliteMemory::in_memory().unwrap()),
            clock,
        ));
        let config = AgentConfig {
            id: "ada".into(),
            name: "Ada".into(),
            description: String::new(),
            traits: vec![],
            interests: vec![],
            speaking_style: None,
            llm_provider: None,
            active: true,
            behavior: Behavior::default(),
            mood: None,
            initial_memory: vec![],
        };
        scheduler
            .add_agent(config, Arc::new(ScriptedProvider::new(vec!["ok".into()])))
            .await
            .unwrap();
        scheduler
    }

    #[tokio::test]
    async fn test_polls_route_inbound_once_and_stop_cleanly() {
        let feed = Arc::new(SandboxFeed::new());
        feed.push_inbound(
            "ada",
            Interaction {
                id: "m-1".into(),
                text: "hi".into(),
                author: "bob".into(),
            },
        );
        let scheduler = scheduler_with_agent(feed.clone()).await;

        let polls = StreamingPolls::new();
        polls.start(&scheduler, Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        polls.stop().await;
        assert!(!polls.is_running());

        // Polled many times, replied exactly once (dedup ledger).
        assert_eq!(feed.posts().len(), 1);

        // The cancelled loop never fires again.
        feed.push_inbound(
            "ada",
            Interaction {
                id: "m-2".into(),
                text: "still there?".into(),
                author: "bob".into(),
            },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(feed.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_errors_do_not_kill_the_loop() {
        let feed = Arc::new(SandboxFeed::new());
        let scheduler = scheduler_with_agent(feed.clone()).await;

        feed.set_failing(true);
        let polls = StreamingPolls::new();
        polls.start(&scheduler, Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Recover: the same loop picks the mention up.
        feed.set_failing(false);
        feed.push_inbound(
            "ada",
            Interaction {
                id: "m-3".into(),
                text: "you alive?".into(),
                author: "carol".into(),
            },
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        polls.stop().await;

        assert_eq!(feed.posts().len(), 1);
    }
}
