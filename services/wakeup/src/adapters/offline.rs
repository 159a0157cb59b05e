//! services/wakeup/src/adapters/offline.rs
//!
//! Stand-in collaborators used when no OpenAI key is configured. Every call
//! reports `Unavailable`, which sends the driver down its fallback path.

use async_trait::async_trait;
use bytes::Bytes;
use wakeup_core::{
    domain::FeedSpec,
    ports::{FeedGenerationService, PortError, PortResult, TextToSpeechService},
};

#[derive(Clone, Debug)]
pub struct OfflineAdapter {
    reason: String,
}

impl OfflineAdapter {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl FeedGenerationService for OfflineAdapter {
    async fn generate_feed(&self, _feed: &FeedSpec) -> PortResult<String> {
        Err(PortError::Unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl TextToSpeechService for OfflineAdapter {
    async fn generate_audio(&self, _text: &str) -> PortResult<Bytes> {
        Err(PortError::Unavailable(self.reason.clone()))
    }
}
