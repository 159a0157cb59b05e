//! crates/wakeup_core/src/feed.rs
//!
//! Turns a [`FeedSpec`] into the prompt an LLM adapter sends. Kept in the core
//! so feed specs can be validated when an alarm is created, long before it rings.

use tracing::warn;

use crate::domain::{FeedKind, FeedSpec};
use crate::error::AlarmError;

/// Upper bound asked of the model, roughly five minutes of speech.
pub const MAX_FEED_WORDS: usize = 400;

/// Loose characters-per-word bound used to flag overly long feeds.
const CHARS_PER_WORD: usize = 7;

const ANCHOR_PERSONA: &str = "You are Ron Burgundy from the movie Anchorman. \
    Be engaging and funny, throwing in some inoffensive dad humor and puns occasionally.";

/// Knobs for prompt construction that come from configuration.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub news_article_count: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            news_article_count: 5,
        }
    }
}

/// A ready-to-send system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPrompt {
    pub system: String,
    pub user: String,
}

impl FeedSpec {
    /// Checks the options each known feed kind needs.
    ///
    /// Unknown kinds pass: they are stored as-is and fail when generated.
    pub fn validate(&self) -> Result<(), AlarmError> {
        match &self.kind {
            FeedKind::TopicFacts if self.option_str("topic").is_none() => Err(
                AlarmError::InvalidFeed("'topic' is required for feed type 'topic_facts'".into()),
            ),
            FeedKind::CustomPrompt if self.option_str("prompt").is_none() => {
                Err(AlarmError::InvalidFeed(
                    "'prompt' is required for feed type 'custom_prompt'".into(),
                ))
            }
            FeedKind::Other(tag) => {
                warn!("Feed type '{}' is not recognised; it will fail when the alarm rings.", tag);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Builds the prompt for this feed.
    pub fn prompt(&self, settings: &FeedSettings) -> Result<FeedPrompt, AlarmError> {
        self.validate()?;
        let system = format!(
            "You are a helpful assistant that writes concise scripts for a morning audio feed. \
             Keep every response under {MAX_FEED_WORDS} words and write plain spoken text, \
             without markdown or links."
        );
        let user = match &self.kind {
            FeedKind::DailyNews => {
                let country = self.option_str("country").unwrap_or("world");
                format!(
                    "{ANCHOR_PERSONA} Provide a concise summary of 3-4 significant current news \
                     headlines from {country} (or globally if 'world'). Focus on factual \
                     reporting, ideally around {} key points and under {MAX_FEED_WORDS} words \
                     in total.",
                    settings.news_article_count
                )
            }
            FeedKind::TopicFacts => {
                let topic = self.option_str("topic").unwrap_or_default();
                format!(
                    "{ANCHOR_PERSONA} Tell me some interesting and fun facts about '{topic}'. \
                     Present it as an engaging short segment for a morning audio feed, under \
                     {MAX_FEED_WORDS} words."
                )
            }
            FeedKind::CustomPrompt => {
                let request = self.option_str("prompt").unwrap_or_default();
                format!(
                    "Provide a response for the following request. The response should be \
                     concise, suitable for a morning audio feed, and under {MAX_FEED_WORDS} \
                     words. User's request: {request}"
                )
            }
            FeedKind::Other(tag) => {
                return Err(AlarmError::InvalidFeed(format!(
                    "unknown feed type '{tag}'"
                )))
            }
        };
        Ok(FeedPrompt { system, user })
    }
}

/// Logs a warning when generated text is likely to run past the word budget.
/// Returns whether the text was flagged.
pub fn check_feed_length(kind: &FeedKind, text: &str) -> bool {
    let too_long = text.chars().count() > MAX_FEED_WORDS * CHARS_PER_WORD;
    if too_long {
        warn!(
            "Generated content for '{}' is quite long ({} chars). May exceed 5 minutes of speech.",
            kind,
            text.chars().count()
        );
    }
    too_long
}
