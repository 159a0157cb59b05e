//! crates/wakeup_core/src/error.rs
//!
//! Errors reported by the alarm entity and the alarm manager.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    /// No alarm with the given id is managed.
    #[error("Alarm not found: {0}")]
    NotFound(String),

    /// An alarm with the given id already exists.
    #[error("Alarm already exists: {0}")]
    Conflict(String),

    /// The requested transition is not legal from the alarm's current state.
    #[error("Invalid alarm state: {0}")]
    InvalidState(String),

    #[error("Repeat day {0} is out of range (0 = Monday .. 6 = Sunday)")]
    InvalidRepeatDay(i64),

    #[error("Invalid time of day '{0}', expected HH:MM or HH:MM:SS")]
    InvalidTime(String),

    #[error("Invalid feed: {0}")]
    InvalidFeed(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PortError),
}

impl AlarmError {
    /// True for errors caused by bad caller input rather than engine state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRepeatDay(_) | Self::InvalidTime(_) | Self::InvalidFeed(_)
        )
    }
}
