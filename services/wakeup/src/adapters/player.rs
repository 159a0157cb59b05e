//! services/wakeup/src/adapters/player.rs
//!
//! Audio playback adapters implementing the `AudioPlaybackService` port.
//!
//! `CommandPlayer` stages each clip as an MP3 file and hands it to an external
//! program such as `mpg123 -q`. `SimulatedPlayer` only logs and waits, for
//! machines without a speaker.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wakeup_core::ports::{AudioClip, AudioPlaybackService, PlaybackOutcome, PortError, PortResult};

/// A token that `stop()` cancels and then replaces, so every playback
/// running at that moment ends and later ones start clean.
#[derive(Default)]
struct StopSignal(Mutex<CancellationToken>);

impl StopSignal {
    async fn current(&self) -> CancellationToken {
        self.0.lock().await.clone()
    }

    async fn fire(&self) {
        let mut token = self.0.lock().await;
        token.cancel();
        *token = CancellationToken::new();
    }
}

//=========================================================================================
// External-command player
//=========================================================================================

pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    audio_dir: PathBuf,
    stop: StopSignal,
}

impl CommandPlayer {
    /// Parses a command line like `mpg123 -q`. The clip path is appended as
    /// the last argument. Returns `None` for a blank command line.
    pub fn from_command_line(command_line: &str, audio_dir: impl Into<PathBuf>) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            audio_dir: audio_dir.into(),
            stop: StopSignal::default(),
        })
    }

    async fn stage(&self, clip: &AudioClip) -> PortResult<PathBuf> {
        tokio::fs::create_dir_all(&self.audio_dir).await.map_err(|e| {
            PortError::Unavailable(format!(
                "could not create audio directory {}: {}",
                self.audio_dir.display(),
                e
            ))
        })?;
        let path = self.audio_dir.join(format!("{}.mp3", clip.name));
        tokio::fs::write(&path, &clip.data)
            .await
            .map_err(|e| {
                PortError::Unexpected(format!("could not write {}: {}", path.display(), e))
            })?;
        debug!("Staged {} bytes of audio at {}.", clip.data.len(), path.display());
        Ok(path)
    }

    fn spawn(&self, path: &Path) -> PortResult<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PortError::Unavailable(format!("could not start '{}': {}", self.program, e))
            })
    }
}

/// Waits for the player process to exit or for either token to fire, then
/// removes the staged file.
async fn supervise(
    mut child: Child,
    path: PathBuf,
    cancel: CancellationToken,
    stop: CancellationToken,
) -> PortResult<PlaybackOutcome> {
    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => {
                info!("Finished playing '{}'.", path.display());
                Ok(PlaybackOutcome::Finished)
            }
            Ok(status) => Err(PortError::Unexpected(format!(
                "player exited with {} for '{}'",
                status,
                path.display()
            ))),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        },
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill player process: {}", e);
            }
            info!("Playback of '{}' cancelled.", path.display());
            Ok(PlaybackOutcome::Cancelled)
        }
        _ = stop.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill player process: {}", e);
            }
            info!("Playback of '{}' stopped.", path.display());
            Ok(PlaybackOutcome::Cancelled)
        }
    };

    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!("Could not remove audio file {}: {}", path.display(), e);
    }
    outcome
}

#[async_trait]
impl AudioPlaybackService for CommandPlayer {
    async fn play(
        &self,
        clip: AudioClip,
        blocking: bool,
        cancel: CancellationToken,
    ) -> PortResult<PlaybackOutcome> {
        let path = self.stage(&clip).await?;
        let child = match self.spawn(&path) {
            Ok(child) => child,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };
        let stop = self.stop.current().await;

        if blocking {
            info!("Playing '{}' (waiting for completion)...", path.display());
            return supervise(child, path, cancel, stop).await;
        }

        info!("Starting playback of '{}' (non-blocking)...", path.display());
        tokio::spawn(async move {
            if let Err(e) = supervise(child, path, cancel, stop).await {
                error!("Background playback failed: {}", e);
            }
        });
        Ok(PlaybackOutcome::Finished)
    }

    async fn stop(&self) -> PortResult<()> {
        self.stop.fire().await;
        Ok(())
    }
}

//=========================================================================================
// Simulated player
//=========================================================================================

/// Pretends to play each clip for a fixed duration.
pub struct SimulatedPlayer {
    duration: Duration,
    stop: StopSignal,
}

impl SimulatedPlayer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            stop: StopSignal::default(),
        }
    }
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl AudioPlaybackService for SimulatedPlayer {
    async fn play(
        &self,
        clip: AudioClip,
        blocking: bool,
        cancel: CancellationToken,
    ) -> PortResult<PlaybackOutcome> {
        info!(
            "(Simulated) Playing '{}' ({} bytes). Playback would take ~{}s.",
            clip.name,
            clip.data.len(),
            self.duration.as_secs()
        );
        if !blocking {
            return Ok(PlaybackOutcome::Finished);
        }

        let stop = self.stop.current().await;
        let outcome = tokio::select! {
            _ = tokio::time::sleep(self.duration) => PlaybackOutcome::Finished,
            _ = cancel.cancelled() => PlaybackOutcome::Cancelled,
            _ = stop.cancelled() => PlaybackOutcome::Cancelled,
        };
        info!("(Simulated) Playback of '{}' ended: {:?}.", clip.name, outcome);
        Ok(outcome)
    }

    async fn stop(&self) -> PortResult<()> {
        self.stop.fire().await;
        Ok(())
    }
}
