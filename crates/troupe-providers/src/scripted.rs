//! Scripted provider — deterministic, offline content generation.
//!
//! Cycles through a fixed set of lines. Used as the fallback when no real
//! provider is configured, and as the provider double in engine tests (it
//! counts its calls).

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use troupe_core::error::Result;
use troupe_core::traits::LlmProvider;
use troupe_core::types::AgentProfile;

const DEFAULT_LINES: &[&str] = &[
    "Thinking out loud today.",
    "Some days the timeline writes itself.",
    "Holding an opinion loosely, as always.",
    "Another small observation for the record.",
];

/// Offline provider that returns canned lines in rotation.
pub struct ScriptedProvider {
    lines: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(lines: Vec<String>) -> Self {
        let lines = if lines.is_empty() {
            DEFAULT_LINES.iter().map(|s| s.to_string()).collect()
        } else {
            lines
        };
        Self {
            lines,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many generations have been requested. Handy in tests.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new(DEFAULT_LINES.iter().map(|s| s.to_string()).collect())
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, agent: &AgentProfile, _prompt: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let line = self.lines[n % self.lines.len()].clone();
        tracing::debug!("Scripted line {} for '{}'", n % self.lines.len(), agent.id);
        Ok(line)
    }
}
