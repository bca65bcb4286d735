//! In-memory sandbox feed.
//!
//! Records every post instead of publishing it and serves queued inbound
//! interactions. Used for dry runs and as the posting double in tests; the
//! `set_failing` switch simulates a broken upstream API.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::PostingClient;
use troupe_core::types::{Interaction, PostReceipt};

/// A post captured by the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxPost {
    pub id: String,
    pub text: String,
    pub reply_to: Option<String>,
}

/// In-memory posting client.
pub struct SandboxFeed {
    posts: Mutex<Vec<SandboxPost>>,
    inbound: Mutex<HashMap<String, Vec<Interaction>>>,
    failing: AtomicBool,
}

impl SandboxFeed {
    pub fn new() -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            inbound: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Everything posted so far, in order.
    pub fn posts(&self) -> Vec<SandboxPost> {
        self.posts.lock().unwrap().clone()
    }

    /// Queue an inbound interaction for an agent. Like a real mentions API,
    /// fetches keep returning it — dedup is the caller's job.
    pub fn push_inbound(&self, agent_id: &str, interaction: Interaction) {
        self.inbound
            .lock()
            .unwrap()
            .entry(agent_id.to_string())
            .or_default()
            .push(interaction);
    }

    /// While failing, every call returns a channel error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_up(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TroupeError::Channel("sandbox feed set to failing".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for SandboxFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostingClient for SandboxFeed {
    async fn post(&self, text: &str, reply_to: Option<&str>) -> Result<PostReceipt> {
        self.check_up()?;
        let id = uuid::Uuid::new_v4().to_string();
        self.posts.lock().unwrap().push(SandboxPost {
            id: id.clone(),
            text: text.to_string(),
            reply_to: reply_to.map(String::from),
        });
        tracing::debug!("📮 Sandbox captured post {id}");
        Ok(PostReceipt { id })
    }

    async fn fetch_inbound(&self, agent_id: &str) -> Result<Vec<Interaction>> {
        self.check_up()?;
        Ok(self
            .inbound
            .lock()
            .unwrap()
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }
}
