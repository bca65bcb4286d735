//! # Troupe Core
//!
//! Shared foundation for the Troupe workspace: the error type, the TOML
//! configuration schema, the domain types (agents, events, mood), and the
//! capability traits every collaborator implements (LLM, posting feed,
//! memory store).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{AgentConfig, EngineConfig};
pub use error::{Result, TroupeError};
pub use types::{
    AgentProfile, AgentStatus, Behavior, Event, EventPriority, Interaction, Mood, MoodDelta,
    PostReceipt,
};
