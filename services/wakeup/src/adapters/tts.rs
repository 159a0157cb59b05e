//! services/wakeup/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `TextToSpeechService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};
use wakeup_core::ports::{PortError, PortResult, TextToSpeechService};

/// Resolves a configured model name.
pub fn speech_model(name: &str) -> Option<SpeechModel> {
    match name.trim().to_lowercase().as_str() {
        "tts-1" => Some(SpeechModel::Tts1),
        "tts-1-hd" => Some(SpeechModel::Tts1Hd),
        _ => None,
    }
}

/// Resolves a configured voice name.
pub fn speech_voice(name: &str) -> Option<Voice> {
    match name.trim().to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiTtsAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
}

impl OpenAiTtsAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, voice: Voice) -> Self {
        Self {
            client,
            model,
            voice,
        }
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for OpenAiTtsAdapter {
    /// Synthesizes MP3 audio for the given text.
    async fn generate_audio(&self, text: &str) -> PortResult<Bytes> {
        if text.trim().is_empty() {
            warn!("No text provided for speech synthesis.");
            return Err(PortError::Unexpected("cannot synthesize empty text".to_string()));
        }

        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .audio()
            .speech()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        debug!("Synthesized {} bytes of audio.", response.bytes.len());
        Ok(response.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("tts-1", true ; "standard")]
    #[test_case("TTS-1-HD", true ; "hd any case")]
    #[test_case("tts-2", false ; "unknown")]
    fn model_names_resolve(name: &str, known: bool) {
        assert_eq!(speech_model(name).is_some(), known);
    }

    #[test_case("alloy", true ; "alloy")]
    #[test_case(" Nova ", true ; "trimmed")]
    #[test_case("robot", false ; "unknown")]
    fn voice_names_resolve(name: &str, known: bool) {
        assert_eq!(speech_voice(name).is_some(), known);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_request() {
        let adapter = OpenAiTtsAdapter::new(
            Client::with_config(OpenAIConfig::new().with_api_key("sk-test")),
            SpeechModel::Tts1,
            Voice::Alloy,
        );
        assert!(matches!(
            adapter.generate_audio("   ").await,
            Err(PortError::Unexpected(_))
        ));
    }
}
