//! # Troupe Memory
//!
//! SQLite-backed agent memory. Fire-and-forget from the engine's
//! perspective: the scheduler records what agents said and saw, and the
//! store keeps it queryable per agent.

pub mod sqlite;

use std::sync::Arc;

use troupe_core::config::{EngineConfig, MemoryConfig};
use troupe_core::error::Result;
use troupe_core::traits::MemoryBackend;

pub use sqlite::SqliteMemory;

/// Create the memory backend named by the config.
pub fn create_memory(config: &MemoryConfig) -> Result<Arc<dyn MemoryBackend>> {
    let path = if config.db_path.is_empty() {
        EngineConfig::home_dir().join("memory.db")
    } else {
        config.db_path.clone().into()
    };
    Ok(Arc::new(SqliteMemory::open(&path)?))
}
