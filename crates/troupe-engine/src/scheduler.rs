//! Agent lifecycle scheduler.
//!
//! Per agent: decides when the next post is allowed, enforces minimum
//! spacing, applies exponential backoff after external-API failures, and
//! dedups inbound interactions. Every mutation of an agent's record goes
//! through that agent's own async mutex, so two listeners or loops touching
//! the same agent never interleave partial updates.
//!
//! All lifecycle transitions are driven by bus dispatch: the scheduler
//! subscribes to `agent.post`, `ambient.news`, `mood.drift`, and
//! `agent.interaction` and emits `agent.post` events back through the bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::json;
use tokio::sync::Mutex;

use troupe_core::config::AgentConfig;
use troupe_core::traits::{LlmProvider, MemoryBackend, PostingClient};
use troupe_core::types::{
    AgentProfile, AgentStatus, Event, Interaction, Mood, MoodDelta, kinds,
};
use troupe_core::{Result, TroupeError};

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::dedup::DedupLedger;

/// Backoff cap, in minutes.
const MAX_COOLDOWN_MINUTES: i64 = 60;

/// Mutable per-agent state. `next_post_time` is owned exclusively by the
/// scheduler.
pub struct AgentRecord {
    pub profile: AgentProfile,
    pub mood: Mood,
    pub active: bool,
    pub last_post_time: Option<DateTime<Utc>>,
    pub next_post_time: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    provider: Arc<dyn LlmProvider>,
}

/// The lifecycle scheduler.
pub struct AgentScheduler {
    agents: RwLock<HashMap<String, Arc<Mutex<AgentRecord>>>>,
    bus: Arc<EventBus>,
    posting: Arc<dyn PostingClient>,
    memory: Arc<dyn MemoryBackend>,
    ledger: DedupLedger,
    clock: Clock,
}

impl AgentScheduler {
    pub fn new(
        bus: Arc<EventBus>,
        posting: Arc<dyn PostingClient>,
        memory: Arc<dyn MemoryBackend>,
        clock: Clock,
    ) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            bus,
            posting,
            memory,
            ledger: DedupLedger::new(clock.clone()),
            clock,
        }
    }

    /// Register an agent from a validated definition, seeding any initial
    /// memories. Fatal on an invalid definition.
    pub async fn add_agent(
        &self,
        config: AgentConfig,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<()> {
        config.validate()?;
        let profile = AgentProfile {
            id: config.id.clone(),
            name: config.display_name().to_string(),
            description: config.description.clone(),
            traits: config.traits.clone(),
            interests: config.interests.clone(),
            speaking_style: config.speaking_style.clone(),
            behavior: config.behavior.clone(),
        };

        for content in &config.initial_memory {
            if let Err(e) = self
                .memory
                .record(&config.id, content, json!({"kind": "core"}))
                .await
            {
                tracing::warn!("Failed to seed memory for '{}': {e}", config.id);
            }
        }

        let record = AgentRecord {
            profile,
            mood: config.mood.unwrap_or_default(),
            active: config.active,
            last_post_time: None,
            next_post_time: None,
            error_count: 0,
            cooldown_until: None,
            provider,
        };
        self.agents
            .write()
            .unwrap()
            .insert(config.id.clone(), Arc::new(Mutex::new(record)));
        tracing::info!("🎭 Agent '{}' loaded", config.id);
        Ok(())
    }

    fn record(&self, agent_id: &str) -> Result<Arc<Mutex<AgentRecord>>> {
        self.agents
            .read()
            .unwrap()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| TroupeError::AgentNotFound(agent_id.to_string()))
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().unwrap().len()
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Ids of known agents, sorted; optionally only the active ones.
    pub async fn agent_ids(&self, active_only: bool) -> Vec<String> {
        let records: Vec<(String, Arc<Mutex<AgentRecord>>)> = {
            let agents = self.agents.read().unwrap();
            agents.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let mut ids = Vec::new();
        for (id, record) in records {
            if !active_only || record.lock().await.active {
                ids.push(id);
            }
        }
        ids.sort();
        ids
    }

    // ── Lifecycle operations ───────────────────────────────

    /// Compute and emit the agent's next `agent.post` event. No-op while the
    /// agent is inactive, still inside its post-spacing window, inside an
    /// error cooldown, or already scheduled. Returns the chosen time when a
    /// post was scheduled.
    pub async fn schedule_next_post(&self, agent_id: &str) -> Result<Option<DateTime<Utc>>> {
        let record = self.record(agent_id)?;
        let mut rec = record.lock().await;
        Ok(self.schedule_next_locked(&mut rec))
    }

    fn schedule_next_locked(&self, rec: &mut AgentRecord) -> Option<DateTime<Utc>> {
        if !rec.active {
            return None;
        }
        let now = self.clock.now();
        if rec.next_post_time.is_some_and(|at| at > now) {
            return None; // a post event is already out
        }
        if rec.cooldown_until.is_some_and(|until| until > now) {
            tracing::debug!("🧊 '{}' in error cooldown, not scheduling", rec.profile.id);
            return None;
        }
        let behavior = &rec.profile.behavior;
        if let Some(last) = rec.last_post_time
            && now - last < hours(behavior.min_hours_between_posts)
        {
            tracing::debug!("'{}' inside post-spacing window", rec.profile.id);
            return None;
        }

        let delay_hours = {
            let mut rng = rand::thread_rng();
            rng.gen_range(behavior.min_hours_between_posts..=behavior.max_hours_between_posts)
        };
        let next = now + hours(delay_hours);
        rec.next_post_time = Some(next);
        self.bus
            .schedule(Event::new(kinds::AGENT_POST).for_agent(&rec.profile.id).at(next));
        tracing::info!("📅 Next post for '{}' scheduled at {}", rec.profile.id, next);
        Some(next)
    }

    /// A scheduled post event fired: generate content, publish it, record
    /// the result, and line up the next post. On any external-API failure
    /// the agent enters backoff and is NOT rescheduled — the periodic sweep
    /// picks it back up once the cooldown has elapsed.
    pub async fn handle_post_event(&self, agent_id: &str) -> Result<()> {
        let record = self.record(agent_id)?;
        let mut rec = record.lock().await;
        rec.next_post_time = None; // the event this call answers has fired
        if !rec.active {
            return Ok(());
        }
        let now = self.clock.now();
        if let Some(until) = rec.cooldown_until
            && until > now
        {
            tracing::debug!("🧊 '{agent_id}' cooling down until {until}, skipping post");
            return Ok(());
        }

        let prompt = prompts::post(&rec.profile, &rec.mood);
        let provider = rec.provider.clone();
        let text = match provider.generate(&rec.profile, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("⚠️ Content generation failed for '{agent_id}': {e}");
                self.apply_api_error(&mut rec);
                return Ok(());
            }
        };

        match self.posting.post(&text, None).await {
            Ok(receipt) => {
                let posted_at = self.clock.now();
                rec.last_post_time = Some(posted_at);
                rec.error_count = 0;
                rec.cooldown_until = None;
                tracing::info!("🗣️ '{agent_id}' posted ({})", receipt.id);
                if let Err(e) = self
                    .memory
                    .record(agent_id, &text, json!({"kind": "post", "post_id": receipt.id}))
                    .await
                {
                    tracing::warn!("Failed to record post memory for '{agent_id}': {e}");
                }
                self.schedule_next_locked(&mut rec);
            }
            Err(e) => {
                tracing::warn!("⚠️ Post failed for '{agent_id}': {e}");
                self.apply_api_error(&mut rec);
            }
        }
        Ok(())
    }

    /// Register an external-API failure for the agent: bump the error
    /// counter and set cooldown-end = now + min(2^count, 60) minutes.
    pub async fn record_api_error(&self, agent_id: &str) -> Result<DateTime<Utc>> {
        let record = self.record(agent_id)?;
        let mut rec = record.lock().await;
        Ok(self.apply_api_error(&mut rec))
    }

    fn apply_api_error(&self, rec: &mut AgentRecord) -> DateTime<Utc> {
        rec.error_count += 1;
        let minutes = (1i64 << rec.error_count.min(6)).min(MAX_COOLDOWN_MINUTES);
        let until = self.clock.now() + Duration::minutes(minutes);
        rec.cooldown_until = Some(until);
        tracing::warn!(
            "🧊 '{}' cooling down {minutes} min after error #{} (until {until})",
            rec.profile.id,
            rec.error_count
        );
        until
    }

    /// React to one inbound interaction (mention/reply). Already-handled ids
    /// are silently absorbed by the dedup ledger; failures are logged and
    /// converted into a cooldown, never raised to the poll loop.
    pub async fn handle_inbound_interaction(
        &self,
        agent_id: &str,
        interaction: &Interaction,
    ) -> Result<()> {
        let record = self.record(agent_id)?;
        let mut rec = record.lock().await;
        if !rec.active {
            return Ok(());
        }
        if !self.ledger.check_and_mark(&interaction.id) {
            tracing::debug!("Interaction {} already handled", interaction.id);
            return Ok(());
        }

        let prompt = prompts::reply(&rec.profile, &rec.mood, interaction);
        let provider = rec.provider.clone();
        let reply = match provider.generate(&rec.profile, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("⚠️ Reply generation failed for '{agent_id}': {e}");
                self.apply_api_error(&mut rec);
                return Ok(());
            }
        };

        match self.posting.post(&reply, Some(&interaction.id)).await {
            Ok(receipt) => {
                tracing::info!("💬 '{agent_id}' replied to {}", interaction.id);
                let content = format!(
                    "Replied to @{} ({}): {reply}",
                    interaction.author, interaction.text
                );
                if let Err(e) = self
                    .memory
                    .record(
                        agent_id,
                        &content,
                        json!({
                            "kind": "interaction",
                            "reply_to": interaction.id,
                            "post_id": receipt.id,
                        }),
                    )
                    .await
                {
                    tracing::warn!("Failed to record interaction memory for '{agent_id}': {e}");
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Reply post failed for '{agent_id}': {e}");
                self.apply_api_error(&mut rec);
            }
        }
        Ok(())
    }

    /// Apply a mood delta, clamping every component. Serialized with every
    /// other mutation of the same agent. Returns the resulting mood.
    pub async fn apply_mood_delta(&self, agent_id: &str, delta: MoodDelta) -> Result<Mood> {
        let record = self.record(agent_id)?;
        let mut rec = record.lock().await;
        rec.mood.apply(&delta);
        Ok(rec.mood)
    }

    /// Maybe react to an ambient headline, gated by the agent's
    /// `reaction_probability`.
    pub async fn react_to_news(&self, agent_id: &str, headline: &str) -> Result<()> {
        let record = self.record(agent_id)?;
        let mut rec = record.lock().await;
        if !rec.active {
            return Ok(());
        }
        let now = self.clock.now();
        if rec.cooldown_until.is_some_and(|until| until > now) {
            return Ok(());
        }
        if rand::random::<f64>() >= rec.profile.behavior.reaction_probability {
            return Ok(());
        }

        let prompt = prompts::news_reaction(&rec.profile, &rec.mood, headline);
        let provider = rec.provider.clone();
        match provider.generate(&rec.profile, &prompt).await {
            Ok(text) => match self.posting.post(&text, None).await {
                Ok(receipt) => {
                    tracing::info!("📰 '{agent_id}' reacted to headline ({})", receipt.id);
                    if let Err(e) = self
                        .memory
                        .record(
                            agent_id,
                            &format!("Reacted to headline \"{headline}\": {text}"),
                            json!({"kind": "news", "post_id": receipt.id}),
                        )
                        .await
                    {
                        tracing::warn!("Failed to record news memory for '{agent_id}': {e}");
                    }
                }
                Err(e) => {
                    tracing::warn!("⚠️ News reaction post failed for '{agent_id}': {e}");
                    self.apply_api_error(&mut rec);
                }
            },
            Err(e) => {
                tracing::warn!("⚠️ News reaction generation failed for '{agent_id}': {e}");
                self.apply_api_error(&mut rec);
            }
        }
        Ok(())
    }

    /// The interaction generator sampled this (source, target) pair: source
    /// posts something addressed at target.
    pub async fn handle_interaction_prompt(&self, source_id: &str, target_id: &str) -> Result<()> {
        let target_name = {
            let target = self.record(target_id)?;
            let target = target.lock().await;
            target.profile.name.clone()
        };

        let record = self.record(source_id)?;
        let mut rec = record.lock().await;
        if !rec.active {
            return Ok(());
        }
        let now = self.clock.now();
        if rec.cooldown_until.is_some_and(|until| until > now) {
            return Ok(());
        }

        let prompt = prompts::interaction(&rec.profile, &rec.mood, &target_name);
        let provider = rec.provider.clone();
        match provider.generate(&rec.profile, &prompt).await {
            Ok(text) => match self.posting.post(&text, None).await {
                Ok(receipt) => {
                    tracing::info!("🤝 '{source_id}' reached out to '{target_id}' ({})", receipt.id);
                    if let Err(e) = self
                        .memory
                        .record(
                            source_id,
                            &format!("Reached out to {target_name}: {text}"),
                            json!({"kind": "interaction", "target": target_id, "post_id": receipt.id}),
                        )
                        .await
                    {
                        tracing::warn!("Failed to record interaction memory for '{source_id}': {e}");
                    }
                }
                Err(e) => {
                    tracing::warn!("⚠️ Interaction post failed for '{source_id}': {e}");
                    self.apply_api_error(&mut rec);
                }
            },
            Err(e) => {
                tracing::warn!("⚠️ Interaction generation failed for '{source_id}': {e}");
                self.apply_api_error(&mut rec);
            }
        }
        Ok(())
    }

    /// Fetch inbound interactions for an agent and handle the unseen ones.
    /// Returns how many were fetched. Fetch errors propagate to the caller
    /// (the poll loop logs and carries on).
    pub async fn poll_inbound(&self, agent_id: &str) -> Result<usize> {
        let inbound = self.posting.fetch_inbound(agent_id).await?;
        let fetched = inbound.len();
        for interaction in &inbound {
            if let Err(e) = self.handle_inbound_interaction(agent_id, interaction).await {
                tracing::warn!("⚠️ Inbound handling failed for '{agent_id}': {e}");
            }
        }
        Ok(fetched)
    }

    // ── Status & control ───────────────────────────────────

    /// Operator-facing snapshot of one agent.
    pub async fn get_status(&self, agent_id: &str) -> Result<AgentStatus> {
        let record = self.record(agent_id)?;
        let rec = record.lock().await;
        Ok(AgentStatus {
            id: rec.profile.id.clone(),
            name: rec.profile.name.clone(),
            active: rec.active,
            last_post_time: rec.last_post_time,
            next_post_time: rec.next_post_time,
            error_count: rec.error_count,
            cooldown_until: rec.cooldown_until,
            mood: rec.mood,
        })
    }

    /// Status snapshots for every agent, sorted by id.
    pub async fn all_statuses(&self) -> Vec<AgentStatus> {
        let mut statuses = Vec::new();
        for id in self.agent_ids(false).await {
            if let Ok(status) = self.get_status(&id).await {
                statuses.push(status);
            }
        }
        statuses
    }

    /// Out-of-band activation toggle. Deactivated agents stay registered but
    /// are skipped by every lifecycle operation.
    pub async fn set_active(&self, agent_id: &str, active: bool) -> Result<()> {
        let record = self.record(agent_id)?;
        let mut rec = record.lock().await;
        rec.active = active;
        tracing::info!(
            "Agent '{agent_id}' {}",
            if active { "activated" } else { "deactivated" }
        );
        Ok(())
    }

    // ── Bus wiring ─────────────────────────────────────────

    /// Subscribe the scheduler's listeners on the bus. Call once after
    /// construction; from then on every lifecycle transition is driven by
    /// dispatch.
    pub fn attach_listeners(self: Arc<Self>) {
        let sched = self.clone();
        self.bus.subscribe(kinds::AGENT_POST, move |event: Event| {
            let sched = sched.clone();
            async move {
                let Some(agent_id) = event.agent_id else {
                    return Ok(());
                };
                sched.handle_post_event(&agent_id).await
            }
        });

        let sched = self.clone();
        self.bus.subscribe(kinds::NEWS, move |event: Event| {
            let sched = sched.clone();
            async move {
                let Some(headline) = event
                    .payload
                    .get("headline")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                else {
                    return Ok(());
                };
                for agent_id in sched.agent_ids(true).await {
                    if let Err(e) = sched.react_to_news(&agent_id, &headline).await {
                        tracing::warn!("News reaction failed for '{agent_id}': {e}");
                    }
                }
                Ok(())
            }
        });

        let sched = self.clone();
        self.bus.subscribe(kinds::MOOD, move |event: Event| {
            let sched = sched.clone();
            async move {
                let Some(agent_id) = event.agent_id else {
                    return Ok(());
                };
                let delta: MoodDelta =
                    serde_json::from_value(event.payload.clone()).unwrap_or_default();
                sched.apply_mood_delta(&agent_id, delta).await.map(|_| ())
            }
        });

        let sched = self.clone();
        self.bus.subscribe(kinds::INTERACTION, move |event: Event| {
            let sched = sched.clone();
            async move {
                let Some(source) = event.agent_id else {
                    return Ok(());
                };
                let Some(target) = event
                    .payload
                    .get("target")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                else {
                    return Ok(());
                };
                sched.handle_interaction_prompt(&source, &target).await
            }
        });
    }
}

fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0) as i64)
}

/// Thin prompt assembly — the voice comes from the profile, the words from
/// the LLM collaborator.
mod prompts {
    use troupe_core::types::{AgentProfile, Interaction, Mood};

    fn persona(profile: &AgentProfile) -> String {
        let mut lines = vec![format!("You are {}.", profile.name)];
        if !profile.description.is_empty() {
            lines.push(profile.description.clone());
        }
        if !profile.traits.is_empty() {
            lines.push(format!("Traits: {}.", profile.traits.join(", ")));
        }
        if !profile.interests.is_empty() {
            lines.push(format!("Interests: {}.", profile.interests.join(", ")));
        }
        if let Some(style) = &profile.speaking_style {
            lines.push(format!("Speaking style: {style}."));
        }
        lines.join(" ")
    }

    fn mood_line(mood: &Mood) -> String {
        format!(
            "Current mood: valence {:.2}, arousal {:.2}, dominance {:.2}.",
            mood.valence, mood.arousal, mood.dominance
        )
    }

    pub fn post(profile: &AgentProfile, mood: &Mood) -> String {
        format!(
            "{}\n{}\nWrite a short original post in your own voice.",
            persona(profile),
            mood_line(mood)
        )
    }

    pub fn reply(profile: &AgentProfile, mood: &Mood, interaction: &Interaction) -> String {
        format!(
            "{}\n{}\n@{} said to you: \"{}\"\nReply in character, briefly.",
            persona(profile),
            mood_line(mood),
            interaction.author,
            interaction.text
        )
    }

    pub fn news_reaction(profile: &AgentProfile, mood: &Mood, headline: &str) -> String {
        format!(
            "{}\n{}\nReact to this headline in one short post: {headline}",
            persona(profile),
            mood_line(mood)
        )
    }

    pub fn interaction(profile: &AgentProfile, mood: &Mood, target_name: &str) -> String {
        format!(
            "{}\n{}\nWrite a short post addressed to {target_name}, in your own voice.",
            persona(profile),
            mood_line(mood)
        )
    }
}
