//! services/wakeup/src/adapters/feed_llm.rs
//!
//! This module contains the adapter for the feed-writing LLM.
//! It implements the `FeedGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::info;
use wakeup_core::{
    domain::FeedSpec,
    feed::{check_feed_length, FeedSettings},
    ports::{FeedGenerationService, PortError, PortResult},
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `FeedGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiFeedAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    settings: FeedSettings,
}

impl OpenAiFeedAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String, settings: FeedSettings) -> Self {
        Self {
            client,
            model,
            settings,
        }
    }
}

//=========================================================================================
// `FeedGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl FeedGenerationService for OpenAiFeedAdapter {
    /// Writes the spoken briefing for a feed with a single chat completion.
    async fn generate_feed(&self, feed: &FeedSpec) -> PortResult<String> {
        let prompt = feed
            .prompt(&self.settings)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        info!("Requesting '{}' feed from model {}.", feed.kind, self.model);

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.user)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                PortError::Unexpected("Feed LLM returned no choices in its response.".to_string())
            })?
            .message
            .content
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                PortError::Unexpected("Feed LLM response contained no text content.".to_string())
            })?;

        check_feed_length(&feed.kind, &text);
        Ok(text)
    }
}
