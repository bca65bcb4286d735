//! Troupe configuration system.
//!
//! One TOML file for the engine (`~/.troupe/config.toml` by default) plus a
//! directory of per-agent TOML definitions. Malformed agent definitions are
//! fatal at load time — an agent is never silently half-loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TroupeError};
use crate::types::{Behavior, Mood};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory of per-agent TOML definitions.
    #[serde(default = "default_agents_dir")]
    pub agents_dir: String,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub events: EventIntervals,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_agents_dir() -> String {
    "agents".into()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agents_dir: default_agents_dir(),
            bus: BusConfig::default(),
            events: EventIntervals::default(),
            streaming: StreamingConfig::default(),
            llm: LlmConfig::default(),
            channel: ChannelConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from the default path, falling back to defaults if the
    /// file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TroupeError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TroupeError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path (~/.troupe/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Troupe home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".troupe")
    }
}

/// Event bus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// How often the promotion loop scans pending events, in seconds.
    #[serde(default = "default_promotion_interval")]
    pub promotion_interval_secs: u64,
    /// Maximum retained dispatch history entries.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_promotion_interval() -> u64 {
    1
}
fn default_history_cap() -> usize {
    500
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            promotion_interval_secs: default_promotion_interval(),
            history_cap: default_history_cap(),
        }
    }
}

/// Periodic generator intervals, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventIntervals {
    #[serde(default = "default_news_interval")]
    pub news_interval_secs: u64,
    #[serde(default = "default_mood_interval")]
    pub mood_interval_secs: u64,
    #[serde(default = "default_interaction_interval")]
    pub interaction_interval_secs: u64,
    /// How often the schedule sweep re-checks every agent, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub schedule_sweep_secs: u64,
}

fn default_news_interval() -> u64 {
    6 * 60 * 60
}
fn default_mood_interval() -> u64 {
    4 * 60 * 60
}
fn default_interaction_interval() -> u64 {
    8 * 60 * 60
}
fn default_sweep_interval() -> u64 {
    5 * 60
}

impl Default for EventIntervals {
    fn default() -> Self {
        Self {
            news_interval_secs: default_news_interval(),
            mood_interval_secs: default_mood_interval(),
            interaction_interval_secs: default_interaction_interval(),
            schedule_sweep_secs: default_sweep_interval(),
        }
    }
}

/// Inbound poll loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Sleep between inbound polls per agent, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Default LLM provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai", "scripted", or "custom:<base-url>".
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    /// Endpoint override; empty = provider default.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_provider() -> String {
    "openai".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    280
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: String::new(),
            endpoint: String::new(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Posting feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// "sandbox" (in-memory, dry runs) or "http".
    #[serde(default = "default_channel_mode")]
    pub mode: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_channel_mode() -> String {
    "sandbox".into()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            mode: default_channel_mode(),
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

/// Memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// SQLite database path; empty = ~/.troupe/memory.db.
    #[serde(default)]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),
        }
    }
}

/// One agent definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub speaking_style: Option<String>,
    /// Named LLM provider override; `None` = engine default.
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default = "bool_true")]
    pub active: bool,
    #[serde(default)]
    pub behavior: Behavior,
    /// Starting mood; defaults to neutral.
    #[serde(default)]
    pub mood: Option<Mood>,
    /// Seed memories recorded at load time.
    #[serde(default)]
    pub initial_memory: Vec<String>,
}

fn bool_true() -> bool {
    true
}

impl AgentConfig {
    /// Validate the definition. Errors here are fatal at load time.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(TroupeError::Config("Agent definition must have an id".into()));
        }
        let b = &self.behavior;
        if b.min_hours_between_posts < 0.0 {
            return Err(TroupeError::Config(format!(
                "Agent '{}': min_hours_between_posts must be >= 0",
                self.id
            )));
        }
        if b.max_hours_between_posts < b.min_hours_between_posts {
            return Err(TroupeError::Config(format!(
                "Agent '{}': max_hours_between_posts must be >= min_hours_between_posts",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&b.reaction_probability) {
            return Err(TroupeError::Config(format!(
                "Agent '{}': reaction_probability must be within [0, 1]",
                self.id
            )));
        }
        Ok(())
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// Load and validate every `*.toml` agent definition in a directory.
pub fn load_agent_configs(dir: &Path) -> Result<Vec<AgentConfig>> {
    if !dir.exists() {
        return Err(TroupeError::Config(format!(
            "Agents directory {} not found",
            dir.display()
        )));
    }
    let mut configs = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    entries.sort();

    for path in entries {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| TroupeError::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: AgentConfig = toml::from_str(&content)
            .map_err(|e| TroupeError::Config(format!("Failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        configs.push(config);
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.bus.promotion_interval_secs, 1);
        assert_eq!(config.events.news_interval_secs, 6 * 60 * 60);
        assert_eq!(config.streaming.poll_interval_secs, 60);
        assert_eq!(config.channel.mode, "sandbox");
    }

    #[test]
    fn test_parse_agent_config() {
        let toml = r#"
            id = "ada"
            name = "Ada"
            traits = ["curious", "dry"]
            [behavior]
            min_hours_between_posts = 2.0
            max_hours_between_posts = 8.0
        "#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.display_name(), "Ada");
        assert!(config.active);
        assert_eq!(config.behavior.max_hours_between_posts, 8.0);
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut config: AgentConfig = toml::from_str(r#"id = "x""#).unwrap();
        config.behavior.max_hours_between_posts = 1.0;
        config.behavior.min_hours_between_posts = 3.0;
        assert!(config.validate().is_err());

        let mut config: AgentConfig = toml::from_str(r#"id = "x""#).unwrap();
        config.behavior.reaction_probability = 1.5;
        assert!(config.validate().is_err());

        let config: AgentConfig = toml::from_str(r#"id = """#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_agent_configs_missing_dir() {
        let missing = std::env::temp_dir().join("troupe-no-such-dir");
        assert!(load_agent_configs(&missing).is_err());
    }
}
