//! Generic HTTP feed client.
//!
//! Speaks a small JSON contract: `POST {base}/posts` with `{text, reply_to}`
//! returning `{id}`, and `GET {base}/mentions/{agent_id}` returning a list
//! of `{id, text, author}`. Errors are surfaced to the caller — retry and
//! backoff live in the scheduler, never here.

use async_trait::async_trait;
use serde_json::{Value, json};

use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::PostingClient;
use troupe_core::types::{Interaction, PostReceipt};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// HTTP posting client.
pub struct HttpFeed {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpFeed {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }
}

#[async_trait]
impl PostingClient for HttpFeed {
    async fn post(&self, text: &str, reply_to: Option<&str>) -> Result<PostReceipt> {
        let url = format!("{}/posts", self.base_url);
        let response = self
            .authed(self.client.post(&url))
            .json(&json!({ "text": text, "reply_to": reply_to }))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| TroupeError::Channel(format!("Post failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TroupeError::Channel(format!(
                "Feed returned {status}: {body}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| TroupeError::Channel(format!("Invalid post response: {e}")))?;
        let id = payload["id"]
            .as_str()
            .ok_or_else(|| TroupeError::Channel("Post response missing id".into()))?;
        tracing::debug!("Posted {id}");
        Ok(PostReceipt { id: id.to_string() })
    }

    async fn fetch_inbound(&self, agent_id: &str) -> Result<Vec<Interaction>> {
        let url = format!("{}/mentions/{agent_id}", self.base_url);
        let response = self
            .authed(self.client.get(&url))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| TroupeError::Channel(format!("Mentions fetch failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TroupeError::Channel(format!(
                "Mentions fetch returned {status}"
            )));
        }

        response
            .json::<Vec<Interaction>>()
            .await
            .map_err(|e| TroupeError::Channel(format!("Invalid mentions response: {e}")))
    }
}
