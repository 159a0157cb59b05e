//! services/wakeup/src/driver.rs
//!
//! The scheduling loop. Every tick asks the `AlarmManager` which alarms are
//! due and sounds them one after another: feed text, speech, then playback.
//! Test-fire requests from the REST layer arrive on a channel and go through
//! the same pipeline between ticks.
//!
//! The `ControlHandle` is the other side: REST handlers and the console button
//! use it to stop or snooze whatever is sounding.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use crate::adapters::console_button::ButtonPress;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wakeup_core::{
    domain::Alarm,
    error::AlarmError,
    manager::AlarmManager,
    ports::{
        AudioClip, AudioPlaybackService, FeedGenerationService, PlaybackOutcome, PortError,
        PortResult, TextToSpeechService,
    },
};

const TEST_QUEUE_DEPTH: usize = 8;
const CLIP_LABEL_CHARS: usize = 20;

/// File-name stem for an alarm's synthesized audio,
/// `alarm_<id>_<label>_<YYYYmmdd_HHMMSS>`.
pub fn clip_name(alarm: &Alarm, at: DateTime<Local>) -> String {
    let label: String = alarm
        .label
        .chars()
        .take(CLIP_LABEL_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("alarm_{}_{}_{}", alarm.id, label, at.format("%Y%m%d_%H%M%S"))
}

//=========================================================================================
// Settings and collaborators
//=========================================================================================

/// The outward-facing services the driver calls for each alarm.
#[derive(Clone)]
pub struct Collaborators {
    pub feeds: Arc<dyn FeedGenerationService>,
    pub speech: Arc<dyn TextToSpeechService>,
    pub player: Arc<dyn AudioPlaybackService>,
}

#[derive(Clone, Debug)]
pub struct DriverSettings {
    pub tick_interval: Duration,
    /// Upper bound on a single playback before it is cancelled.
    pub max_playback: Duration,
    /// Played when feed text or speech cannot be produced.
    pub fallback_sound: Option<PathBuf>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            max_playback: Duration::from_secs(300),
            fallback_sound: None,
        }
    }
}

/// The cancellation token of the clip currently playing, if any.
#[derive(Default)]
struct PlaybackSlot(Mutex<Option<CancellationToken>>);

impl PlaybackSlot {
    /// The new token is also cancelled when `parent` is.
    async fn begin(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        *self.0.lock().await = Some(token.clone());
        token
    }

    async fn finish(&self) {
        self.0.lock().await.take();
    }

    async fn cancel(&self) -> bool {
        match self.0.lock().await.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn is_active(&self) -> bool {
        self.0.lock().await.is_some()
    }
}

//=========================================================================================
// Control handle
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Alarm(#[from] AlarmError),
    #[error("The alarm driver is not running")]
    DriverStopped,
    #[error("Too many test alarms are already queued")]
    QueueFull,
}

/// Stop, snooze and test-fire requests from outside the driver.
#[derive(Clone)]
pub struct ControlHandle {
    manager: Arc<AlarmManager>,
    player: Arc<dyn AudioPlaybackService>,
    playback: Arc<PlaybackSlot>,
    test_tx: mpsc::Sender<Alarm>,
}

impl ControlHandle {
    /// Cancels the current playback and stops the player. Returns whether
    /// something was playing. Nothing is re-armed.
    pub async fn stop(&self) -> bool {
        let was_playing = self.playback.cancel().await;
        if let Err(e) = self.player.stop().await {
            warn!("Audio player failed to stop: {}", e);
        }
        if was_playing {
            info!("Stop requested. Current playback cancelled.");
        } else {
            info!("Stop requested, but nothing was playing.");
        }
        was_playing
    }

    /// Snoozes every sounding alarm for `minutes` and stops the audio.
    /// Returns the labels of the alarms snoozed.
    pub async fn snooze_active(&self, minutes: u32) -> Vec<String> {
        // Must precede `stop()`: once playback ends the driver clears the sounding set.
        let labels = self
            .manager
            .request_snooze_for_active(chrono::Duration::minutes(i64::from(minutes)), Local::now())
            .await;
        self.stop().await;
        labels
    }

    /// Queues an alarm's full pipeline to run once, without touching its
    /// trigger state.
    pub async fn test_alarm(&self, id: &str) -> Result<Alarm, ControlError> {
        let alarm = self.manager.get(id).await?;
        self.test_tx
            .try_send(alarm.clone())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ControlError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => ControlError::DriverStopped,
            })?;
        info!("Test of alarm '{}' (ID: {}) queued.", alarm.label, alarm.id);
        Ok(alarm)
    }

    pub async fn is_playing(&self) -> bool {
        self.playback.is_active().await
    }

    /// Acts on a hardware or console button press.
    pub async fn press(&self, press: ButtonPress, snooze_minutes: u32) {
        info!("Button press: {:?}", press);
        match press {
            ButtonPress::Stop => {
                self.stop().await;
            }
            ButtonPress::Snooze => {
                let labels = self.snooze_active(snooze_minutes).await;
                if labels.is_empty() {
                    info!("Nothing to snooze.");
                }
            }
        }
    }
}

//=========================================================================================
// Driver
//=========================================================================================

pub struct AlarmDriver {
    manager: Arc<AlarmManager>,
    collaborators: Collaborators,
    settings: DriverSettings,
    playback: Arc<PlaybackSlot>,
    test_rx: mpsc::Receiver<Alarm>,
    shutdown: CancellationToken,
}

impl AlarmDriver {
    pub fn new(
        manager: Arc<AlarmManager>,
        collaborators: Collaborators,
        settings: DriverSettings,
    ) -> (Self, ControlHandle) {
        let (test_tx, test_rx) = mpsc::channel(TEST_QUEUE_DEPTH);
        let playback = Arc::new(PlaybackSlot::default());
        let handle = ControlHandle {
            manager: manager.clone(),
            player: collaborators.player.clone(),
            playback: playback.clone(),
            test_tx,
        };
        let driver = Self {
            manager,
            collaborators,
            settings,
            playback,
            test_rx,
            shutdown: CancellationToken::new(),
        };
        (driver, handle)
    }

    /// Runs until `shutdown` is cancelled. Cancelling it also ends any
    /// playback in progress.
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.shutdown = shutdown.clone();
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "Alarm driver started, ticking every {:?}.",
            self.settings.tick_interval
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.tick(Local::now()).await;
                }
                Some(alarm) = self.test_rx.recv() => {
                    info!("--- Testing alarm '{}' (ID: {}) ---", alarm.label, alarm.id);
                    self.sound(&alarm).await;
                }
            }
        }
        info!("Alarm driver stopped.");
    }

    /// Sounds every alarm due at `now`, in scan order.
    pub async fn tick(&self, now: DateTime<Local>) {
        let due = self.manager.scan(now).await;
        for alarm in due {
            info!(
                "--- Processing triggered alarm --- ID: {}, Label: '{}' at {}",
                alarm.id,
                alarm.label,
                alarm.time_of_day.format("%H:%M")
            );
            match self.still_sounding(&alarm.id).await {
                Some(current) if !self.shutdown.is_cancelled() => self.sound(&current).await,
                Some(_) => info!("Shutting down. Skipping alarm '{}'.", alarm.label),
                None => info!(
                    "Alarm '{}' was snoozed or stopped before its turn. Skipping it.",
                    alarm.label
                ),
            }
            self.manager.mark_processing_complete(&alarm.id).await;
        }
    }

    /// The current copy of an alarm that is still waiting to sound, or
    /// `None` once it has been snoozed, silenced or removed.
    async fn still_sounding(&self, id: &str) -> Option<Alarm> {
        let alarm = self.manager.get(id).await.ok()?;
        if alarm.is_snoozing() || !self.manager.is_sounding(id).await {
            return None;
        }
        Some(alarm)
    }

    async fn sound(&self, alarm: &Alarm) {
        let cancel = self.playback.begin(&self.shutdown).await;

        let prepared = tokio::select! {
            prepared = self.prepare_clip(alarm) => prepared,
            _ = cancel.cancelled() => {
                info!(
                    "Alarm '{}' was stopped while its audio was being prepared.",
                    alarm.label
                );
                self.playback.finish().await;
                return;
            }
        };
        let clip = match prepared {
            Ok(clip) => Some(clip),
            Err(e) => {
                warn!(
                    "Failed to prepare audio for '{}': {}. Falling back.",
                    alarm.label, e
                );
                self.fallback_clip().await
            }
        };

        match clip {
            Some(_) if cancel.is_cancelled() => {
                info!("Alarm '{}' was stopped before playback began.", alarm.label);
            }
            Some(clip) => match self.play_guarded(clip, &cancel).await {
                Ok(outcome) => info!("Playback for '{}' ended: {:?}.", alarm.label, outcome),
                Err(e) => error!("Failed to play audio for '{}': {}", alarm.label, e),
            },
            None => info!("No audio available for '{}'. Staying silent.", alarm.label),
        }

        self.playback.finish().await;
    }

    async fn prepare_clip(&self, alarm: &Alarm) -> PortResult<AudioClip> {
        info!(
            "Generating feed content for '{}' (Type: {}).",
            alarm.label, alarm.feed.kind
        );
        let text = self.collaborators.feeds.generate_feed(&alarm.feed).await?;
        debug!(
            "Feed content for '{}' (first 80 chars): '{}'",
            alarm.label,
            text.chars().take(80).collect::<String>()
        );
        let audio = self.collaborators.speech.generate_audio(&text).await?;
        Ok(AudioClip::new(clip_name(alarm, Local::now()), audio))
    }

    async fn fallback_clip(&self) -> Option<AudioClip> {
        let path = self.settings.fallback_sound.as_ref()?;
        match tokio::fs::read(path).await {
            Ok(data) => Some(AudioClip::new("default_alarm_sound", data)),
            Err(e) => {
                error!("Could not read fallback sound {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn play_guarded(
        &self,
        clip: AudioClip,
        cancel: &CancellationToken,
    ) -> PortResult<PlaybackOutcome> {
        let play = self.collaborators.player.play(clip, true, cancel.clone());
        match tokio::time::timeout(self.settings.max_playback, play).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                if let Err(e) = self.collaborators.player.stop().await {
                    warn!("Audio player failed to stop: {}", e);
                }
                Err(PortError::Unexpected(format!(
                    "playback exceeded {:?} and was cut off",
                    self.settings.max_playback
                )))
            }
        }
    }
}
