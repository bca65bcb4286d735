//! Workspace-wide error type.

use thiserror::Error;

/// All errors surfaced by Troupe crates.
#[derive(Debug, Error)]
pub enum TroupeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("API key missing for provider '{0}'")]
    ApiKeyMissing(String),

    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Agent '{0}' not found")]
    AgentNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TroupeError>;
