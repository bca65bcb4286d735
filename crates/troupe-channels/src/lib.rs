//! # Troupe Channels
//!
//! Posting feed implementations: a generic HTTP feed client for a real
//! social endpoint, and an in-memory sandbox feed for dry runs and tests.

pub mod feed;
pub mod sandbox;

use std::sync::Arc;

use troupe_core::config::ChannelConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::PostingClient;

pub use feed::HttpFeed;
pub use sandbox::{SandboxFeed, SandboxPost};

/// Create the posting client named by the channel config.
pub fn create_posting_client(config: &ChannelConfig) -> Result<Arc<dyn PostingClient>> {
    match config.mode.as_str() {
        "sandbox" => Ok(Arc::new(SandboxFeed::new())),
        "http" => {
            if config.base_url.is_empty() {
                return Err(TroupeError::Config(
                    "channel.base_url is required for http mode".into(),
                ));
            }
            Ok(Arc::new(HttpFeed::new(&config.base_url, &config.api_key)))
        }
        other => Err(TroupeError::Config(format!(
            "Unknown channel mode '{other}' (expected \"sandbox\" or \"http\")"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_mode() {
        let config = ChannelConfig::default();
        assert!(create_posting_client(&config).is_ok());
    }

    #[test]
    fn test_http_mode_requires_base_url() {
        let mut config = ChannelConfig::default();
        config.mode = "http".into();
        assert!(create_posting_client(&config).is_err());
        config.base_url = "https://feed.example.com".into();
        assert!(create_posting_client(&config).is_ok());
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        let mut config = ChannelConfig::default();
        config.mode = "carrier-pigeon".into();
        assert!(create_posting_client(&config).is_err());
    }
}
