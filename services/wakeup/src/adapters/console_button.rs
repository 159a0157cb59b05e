//! services/wakeup/src/adapters/console_button.rs
//!
//! A stand-in for the physical alarm button: each line read from the input is
//! one press. An empty line stops the alarm, `s` snoozes it.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPress {
    Stop,
    Snooze,
}

impl ButtonPress {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "" | "stop" => Some(Self::Stop),
            "s" | "snooze" => Some(Self::Snooze),
            _ => None,
        }
    }
}

/// Reads presses from `input` until it closes or `shutdown` fires.
pub async fn listen<R>(input: R, presses: mpsc::Sender<ButtonPress>, shutdown: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    info!("Console button active: press Enter to stop the alarm, 's' + Enter to snooze.");
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => match ButtonPress::parse(&line) {
                Some(press) => {
                    if presses.send(press).await.is_err() {
                        break;
                    }
                }
                None => warn!("Unrecognised console input '{}'.", line.trim()),
            },
            Ok(None) => {
                info!("Console input closed. Button disabled.");
                break;
            }
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        }
    }
}
