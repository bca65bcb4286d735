//! Capability traits for the external collaborators the engine consumes.
//! Each is injected at construction — no ambient wiring, no option bags.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::types::{AgentProfile, Interaction, PostReceipt};

/// Text generation. Failures (timeouts, rate limits) are recoverable and
/// uniformly converted into agent cooldowns by the scheduler.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Generate content in the agent's voice for the given prompt.
    async fn generate(&self, agent: &AgentProfile, prompt: &str) -> Result<String>;
}

/// The social feed. Never retries internally — backoff is entirely the
/// scheduler's responsibility.
#[async_trait]
pub trait PostingClient: Send + Sync {
    /// Publish a post, optionally as a reply to an external id.
    async fn post(&self, text: &str, reply_to: Option<&str>) -> Result<PostReceipt>;

    /// Fetch new inbound interactions (mentions, replies) for an agent.
    async fn fetch_inbound(&self, agent_id: &str) -> Result<Vec<Interaction>>;
}

/// A stored memory row, as returned by [`MemoryBackend::recent`].
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub id: String,
    pub agent_id: String,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Durable per-agent memory. Fire-and-forget from the engine's perspective;
/// durability guarantees live with the implementation.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Record a memory for an agent.
    async fn record(&self, agent_id: &str, content: &str, metadata: Value) -> Result<()>;

    /// Most recent memories for an agent, newest first.
    async fn recent(&self, agent_id: &str, limit: usize) -> Result<Vec<MemoryRecord>>;
}
