//! crates/wakeup_core/src/ports.rs
//!
//! Defines the service contracts (traits) the alarm engine talks through.
//! These traits form the boundary of the hexagonal architecture, so the engine
//! never depends on a specific storage location, LLM vendor or audio device.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::domain::FeedSpec;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., file system, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable storage for the encoded alarm collection.
///
/// The store deals in raw bytes; encoding and the load-time reconciliation
/// rules live in [`crate::codec`].
#[async_trait]
pub trait AlarmStore: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    async fn load(&self) -> PortResult<Option<Vec<u8>>>;

    /// Replaces the stored collection. Implementations must not leave a
    /// half-written collection behind if they fail part way.
    async fn save(&self, data: &[u8]) -> PortResult<()>;
}

#[async_trait]
pub trait FeedGenerationService: Send + Sync {
    /// Produces the spoken briefing text for a feed.
    async fn generate_feed(&self, feed: &FeedSpec) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str) -> PortResult<Bytes>;
}

/// An encoded (MP3) audio clip handed to a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// File-name stem for players that stage clips on disk.
    pub name: String,
    pub data: Bytes,
}

impl AudioClip {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// How a call to [`AudioPlaybackService::play`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Cancelled,
}

#[async_trait]
pub trait AudioPlaybackService: Send + Sync {
    /// Plays a clip.
    ///
    /// With `blocking` set, the future resolves once playback has finished or
    /// `cancel` fired. Without it, playback is started and the call returns
    /// `Finished` immediately.
    async fn play(
        &self,
        clip: AudioClip,
        blocking: bool,
        cancel: CancellationToken,
    ) -> PortResult<PlaybackOutcome>;

    /// Stops whatever this player is currently playing.
    async fn stop(&self) -> PortResult<()>;
}
