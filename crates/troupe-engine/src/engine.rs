//! The engine facade — one explicitly constructed instance that owns the
//! bus, the scheduler, and every background task, and that collaborators
//! reach by handle rather than through globals.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use troupe_core::config::{AgentConfig, EngineConfig, load_agent_configs};
use troupe_core::traits::{LlmProvider, MemoryBackend, PostingClient};
use troupe_core::types::{AgentStatus, Event};
use troupe_core::Result;

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::generators::EventGenerators;
use crate::scheduler::AgentScheduler;
use crate::streaming::StreamingPolls;

/// The Troupe engine.
pub struct Engine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    scheduler: Arc<AgentScheduler>,
    default_provider: Arc<dyn LlmProvider>,
    named_providers: HashMap<String, Arc<dyn LlmProvider>>,
    generators: tokio::sync::Mutex<Option<EventGenerators>>,
    streaming: StreamingPolls,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl Engine {
    /// Wire up an engine from its collaborators. The scheduler's listeners
    /// are attached immediately; nothing runs until [`Engine::start`].
    pub fn new(
        config: EngineConfig,
        default_provider: Arc<dyn LlmProvider>,
        named_providers: HashMap<String, Arc<dyn LlmProvider>>,
        posting: Arc<dyn PostingClient>,
        memory: Arc<dyn MemoryBackend>,
        clock: Clock,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new(&config.bus, clock.clone()));
        let scheduler = Arc::new(AgentScheduler::new(
            bus.clone(),
            posting,
            memory,
            clock,
        ));
        scheduler.clone().attach_listeners();
        Arc::new(Self {
            config,
            bus,
            scheduler,
            default_provider,
            named_providers,
            generators: tokio::sync::Mutex::new(None),
            streaming: StreamingPolls::new(),
            sweep_task: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register one agent, resolving its LLM provider against the named
    /// registry (falling back to the default with a warning, the way an
    /// operator would expect a typo to degrade rather than crash).
    pub async fn add_agent(&self, config: AgentConfig) -> Result<()> {
        let provider = match &config.llm_provider {
            Some(name) => match self.named_providers.get(name) {
                Some(provider) => provider.clone(),
                None => {
                    tracing::warn!(
                        "LLM provider '{name}' not found for agent '{}', using default ({})",
                        config.id,
                        self.default_provider.name()
                    );
                    self.default_provider.clone()
                }
            },
            None => self.default_provider.clone(),
        };
        self.scheduler.add_agent(config, provider).await
    }

    /// Load every agent definition in a directory. Any invalid definition
    /// aborts the load.
    pub async fn load_agents(&self, dir: &Path) -> Result<usize> {
        let configs = load_agent_configs(dir)?;
        let count = configs.len();
        for config in configs {
            self.add_agent(config).await?;
        }
        tracing::info!("Loaded {count} agent(s)");
        Ok(count)
    }

    /// Start everything: bus loops, initial post scheduling, periodic
    /// generators, the schedule sweep, and the inbound poll loops.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bus.clone().start();

        for agent_id in self.scheduler.agent_ids(true).await {
            if let Err(e) = self.scheduler.schedule_next_post(&agent_id).await {
                tracing::warn!("Initial scheduling failed for '{agent_id}': {e}");
            }
        }

        *self.generators.lock().await = Some(EventGenerators::start(
            self.bus.clone(),
            self.scheduler.clone(),
            &self.config.events,
        ));

        let sweep = tokio::spawn(schedule_sweep(
            self.scheduler.clone(),
            self.running.clone(),
            Duration::from_secs(self.config.events.schedule_sweep_secs.max(1)),
        ));
        *self.sweep_task.lock().unwrap() = Some(sweep);

        self.streaming
            .start(
                &self.scheduler,
                Duration::from_secs(self.config.streaming.poll_interval_secs.max(1)),
            )
            .await;

        tracing::info!(
            "🎭 Engine started with {} agent(s)",
            self.scheduler.agent_count()
        );
    }

    /// Stop everything in reverse order, joining every background task.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.streaming.stop().await;

        let sweep = self.sweep_task.lock().unwrap().take();
        if let Some(handle) = sweep {
            handle.abort();
            let _ = handle.await;
        }

        if let Some(mut generators) = self.generators.lock().await.take() {
            generators.stop().await;
        }

        self.bus.stop().await;
        tracing::info!("🎭 Engine stopped");
    }

    // ── Surface for orchestration layers ───────────────────

    /// Queue an event for dispatch.
    pub fn queue(&self, event: Event) {
        self.bus.queue(event);
    }

    /// Schedule a delayed event.
    pub fn schedule(&self, event: Event) {
        self.bus.schedule(event);
    }

    /// Subscribe a listener on the bus.
    pub fn subscribe<F, Fut>(&self, kind: &str, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.bus.subscribe(kind, handler);
    }

    /// Status snapshot for one agent.
    pub async fn status(&self, agent_id: &str) -> Result<AgentStatus> {
        self.scheduler.get_status(agent_id).await
    }

    /// Status snapshots for every agent.
    pub async fn statuses(&self) -> Vec<AgentStatus> {
        self.scheduler.all_statuses().await
    }

    /// Toggle an agent's active flag.
    pub async fn set_active(&self, agent_id: &str, active: bool) -> Result<()> {
        self.scheduler.set_active(agent_id, active).await
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn scheduler(&self) -> &Arc<AgentScheduler> {
        &self.scheduler
    }
}

/// Re-check every agent on a fixed interval. This is the periodic trigger
/// that moves agents out of cooldown or post-spacing back into a scheduled
/// state; `schedule_next_post` itself no-ops for agents that are not ready.
async fn schedule_sweep(
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
        for agent_id in scheduler.agent_ids(true).await {
            if let Err(e) = scheduler.schedule_next_post(&agent_id).await {
                tracing::warn!("Schedule sweep failed for '{agent_id}': {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_channels::SandboxFeed;
    use troupe_core::types::{Behavior, kinds};
    use troupe_memory::SqliteMemory;
    use troupe_providers::ScriptedProvider;

    fn agent_config(id: &str, min_hours: f64, max_hours: f64) -> AgentConfig {
        AgentConfig {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            traits: vec![],
            interests: vec![],
            speaking_style: None,
            llm_provider: None,
            active: true,
            behavior: Behavior {
                min_hours_between_posts: min_hours,
                max_hours_between_posts: max_hours,
                reaction_probability: 0.0,
            },
            mood: None,
            initial_memory: vec![],
        }
    }

    fn test_engine(feed: Arc<SandboxFeed>) -> Arc<Engine> {
        let mut config = EngineConfig::default();
        // Keep the background loops quiet during tests.
        config.events.news_interval_secs = 3600;
        config.events.mood_interval_secs = 3600;
        config.events.interaction_interval_secs = 3600;
        config.events.schedule_sweep_secs = 3600;
        Engine::new(
            config,
            Arc::new(ScriptedProvider::new(vec!["scripted".into()])),
            HashMap::new(),
            feed,
            Arc::new(SqliteMemory::in_memory().unwrap()),
            Clock::system(),
        )
    }

    #[tokio::test]
    async fn test_start_schedules_posts_and_stop_tears_down() {
        let feed = Arc::new(SandboxFeed::new());
        let engine = test_engine(feed.clone());
        engine.add_agent(agent_config("ada", 3.0, 12.0)).await.unwrap();
        engine.add_agent(agent_config("byron", 3.0, 12.0)).await.unwrap();

        engine.start().await;
        let statuses = engine.statuses().await;
        assert_eq!(statuses.len(), 2);
        for status in &statuses {
            assert!(status.active);
            assert!(status.next_post_time.is_some());
            assert_eq!(status.error_count, 0);
        }
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_immediate_cadence_posts_end_to_end() {
        let feed = Arc::new(SandboxFeed::new());
        let engine = test_engine(feed.clone());
        // Zero-hour cadence: the initial schedule is due immediately.
        engine.add_agent(agent_config("ada", 0.0, 0.0)).await.unwrap();

        engine.start().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop().await;

        assert!(!feed.posts().is_empty());
        let status = engine.status("ada").await.unwrap();
        assert!(status.last_post_time.is_some());
        assert_eq!(status.error_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_named_provider_falls_back_to_default() {
        let feed = Arc::new(SandboxFeed::new());
        let engine = test_engine(feed);
        let mut config = agent_config("ada", 3.0, 12.0);
        config.llm_provider = Some("no-such-provider".into());
        engine.add_agent(config).await.unwrap();
        assert_eq!(engine.scheduler().agent_count(), 1);
    }

    #[tokio::test]
    async fn test_surface_queue_and_subscribe() {
        let feed = Arc::new(SandboxFeed::new());
        let engine = test_engine(feed);
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        engine.subscribe("custom.kind", move |_event: Event| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() += 1;
                Ok(())
            }
        });

        engine.start().await;
        engine.queue(Event::new("custom.kind"));
        engine.queue(Event::new(kinds::NEWS)); // no agents react at p=0
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.stop().await;

        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
