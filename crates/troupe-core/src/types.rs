//! Domain types — agents, mood, events, and the wire-adjacent records
//! exchanged with collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known event kinds routed through the bus. Listeners subscribe by
/// kind; custom kinds are allowed, these are just the ones the engine emits.
pub mod kinds {
    /// A scheduled post is due for the target agent.
    pub const AGENT_POST: &str = "agent.post";
    /// Ambient headline broadcast to every interested agent.
    pub const NEWS: &str = "ambient.news";
    /// Per-agent mood drift delta.
    pub const MOOD: &str = "mood.drift";
    /// Prompt one agent to interact with another.
    pub const INTERACTION: &str = "agent.interaction";
}

/// Dispatch priority. Declaration order defines the ordering:
/// `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A typed, optionally delayed, optionally prioritized message.
/// Immutable once built — construct with [`Event::new`] and the `with_*`
/// builders, then hand it to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID.
    pub id: String,
    /// Event kind (see [`kinds`]).
    pub kind: String,
    /// Target agent. `None` = broadcast to all interested listeners.
    pub agent_id: Option<String>,
    /// Opaque structured payload.
    #[serde(default)]
    pub payload: Value,
    /// Dispatch priority tier.
    #[serde(default)]
    pub priority: EventPriority,
    /// If set and in the future, the event stays pending until due.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create a broadcast event of the given kind with default priority.
    pub fn new(kind: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            agent_id: None,
            payload: Value::Null,
            priority: EventPriority::Normal,
            scheduled_for: None,
            created_at: Utc::now(),
        }
    }

    /// Target a specific agent.
    pub fn for_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the priority tier.
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Delay dispatch until the given time.
    pub fn at(mut self, when: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(when);
        self
    }
}

/// Bounds applied to every mood component.
pub const MOOD_MIN: f64 = -1.0;
pub const MOOD_MAX: f64 = 1.0;

/// Agent mood — three bounded scalars, each clamped to
/// [`MOOD_MIN`, `MOOD_MAX`] on every update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mood {
    pub valence: f64,
    pub arousal: f64,
    pub dominance: f64,
}

impl Default for Mood {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.0,
            dominance: 0.0,
        }
    }
}

impl Mood {
    /// Apply a delta component-wise, clamping each result to bounds.
    pub fn apply(&mut self, delta: &MoodDelta) {
        self.valence = (self.valence + delta.valence).clamp(MOOD_MIN, MOOD_MAX);
        self.arousal = (self.arousal + delta.arousal).clamp(MOOD_MIN, MOOD_MAX);
        self.dominance = (self.dominance + delta.dominance).clamp(MOOD_MIN, MOOD_MAX);
    }
}

/// A component-wise mood adjustment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MoodDelta {
    #[serde(default)]
    pub valence: f64,
    #[serde(default)]
    pub arousal: f64,
    #[serde(default)]
    pub dominance: f64,
}

/// Posting cadence and interaction tendencies for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Behavior {
    /// Minimum spacing between two posts, in hours.
    #[serde(default = "default_min_hours")]
    pub min_hours_between_posts: f64,
    /// Upper bound of the random post delay, in hours.
    #[serde(default = "default_max_hours")]
    pub max_hours_between_posts: f64,
    /// Probability that the agent reacts to an ambient headline.
    #[serde(default = "default_reaction_probability")]
    pub reaction_probability: f64,
}

fn default_min_hours() -> f64 {
    3.0
}
fn default_max_hours() -> f64 {
    12.0
}
fn default_reaction_probability() -> f64 {
    0.3
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            min_hours_between_posts: default_min_hours(),
            max_hours_between_posts: default_max_hours(),
            reaction_probability: default_reaction_probability(),
        }
    }
}

/// The identity and voice of an agent, carried into every prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub speaking_style: Option<String>,
    #[serde(default)]
    pub behavior: Behavior,
}

/// An inbound interaction fetched from the feed (mention, reply).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// External identifier — the dedup key.
    pub id: String,
    pub text: String,
    pub author: String,
}

/// Receipt returned by the posting collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostReceipt {
    pub id: String,
}

/// Operator-facing status snapshot for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub last_post_time: Option<DateTime<Utc>>,
    pub next_post_time: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub mood: Mood,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(EventPriority::Critical > EventPriority::High);
        assert!(EventPriority::High > EventPriority::Normal);
        assert!(EventPriority::Normal > EventPriority::Low);
    }

    #[test]
    fn test_event_builder() {
        let when = Utc::now() + chrono::Duration::hours(1);
        let ev = Event::new(kinds::AGENT_POST)
            .for_agent("ada")
            .with_priority(EventPriority::High)
            .at(when);
        assert_eq!(ev.kind, kinds::AGENT_POST);
        assert_eq!(ev.agent_id.as_deref(), Some("ada"));
        assert_eq!(ev.priority, EventPriority::High);
        assert_eq!(ev.scheduled_for, Some(when));
    }

    #[test]
    fn test_mood_clamps_at_bounds() {
        let mut mood = Mood::default();
        for _ in 0..10 {
            mood.apply(&MoodDelta {
                valence: 0.5,
                arousal: -0.5,
                dominance: 0.9,
            });
        }
        assert_eq!(mood.valence, MOOD_MAX);
        assert_eq!(mood.arousal, MOOD_MIN);
        assert_eq!(mood.dominance, MOOD_MAX);
    }
}
