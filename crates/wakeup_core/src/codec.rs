//! crates/wakeup_core/src/codec.rs
//!
//! Translates the alarm collection to and from its JSON file layout:
//!
//! ```json
//! [
//!   {
//!     "alarm_id": "...",
//!     "alarm_time": "HH:MM:SS",
//!     "label": "...",
//!     "repeat_days": [0, 2],
//!     "enabled": true,
//!     "is_snoozing": false,
//!     "snooze_until_timestamp": null,
//!     "feed_type": "daily_news",
//!     "feed_options": {}
//!   }
//! ]
//! ```
//!
//! Decoding is partial: a record that fails to parse is skipped and reported,
//! the rest load normally.

use chrono::{DateTime, Local, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::domain::{Alarm, AlarmState, FeedKind, FeedOptions, FeedSpec, RepeatDays};
use crate::error::AlarmError;

const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("alarms data is not a JSON array of records: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to encode alarms: {0}")]
    Encode(#[source] serde_json::Error),
}

/// One alarm as it appears in the alarms file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub alarm_id: String,
    pub alarm_time: String,
    pub label: String,
    #[serde(default)]
    pub repeat_days: Vec<i64>,
    pub enabled: bool,
    #[serde(default)]
    pub is_snoozing: bool,
    #[serde(default)]
    pub snooze_until_timestamp: Option<f64>,
    #[serde(default)]
    pub feed_type: FeedKind,
    #[serde(default)]
    pub feed_options: FeedOptions,
}

/// The outcome of decoding a stored collection.
#[derive(Debug, Default)]
pub struct DecodeReport {
    pub alarms: Vec<Alarm>,
    /// Number of records found in the file.
    pub total: usize,
    /// One message per record that was skipped.
    pub skipped: Vec<String>,
}

impl DecodeReport {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

fn to_epoch_seconds(at: DateTime<Local>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Local>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros).map(|utc| utc.with_timezone(&Local))
}

impl From<&Alarm> for AlarmRecord {
    fn from(alarm: &Alarm) -> Self {
        Self {
            alarm_id: alarm.id.clone(),
            alarm_time: alarm.time_of_day.format(TIME_FORMAT).to_string(),
            label: alarm.label.clone(),
            repeat_days: alarm.repeat_days.iter().map(i64::from).collect(),
            enabled: alarm.is_enabled(),
            is_snoozing: alarm.is_snoozing(),
            snooze_until_timestamp: alarm.snooze_until().map(to_epoch_seconds),
            feed_type: alarm.feed.kind.clone(),
            feed_options: alarm.feed.options.clone(),
        }
    }
}

impl AlarmRecord {
    /// Builds the alarm this record describes, dropping a snooze whose
    /// deadline is already behind `now`.
    ///
    /// The snooze state is derived from the deadline: a record is snoozing
    /// when it is enabled and carries a deadline, whatever `is_snoozing` says.
    pub fn into_alarm(self, now: DateTime<Local>) -> Result<Alarm, AlarmError> {
        let time_of_day = NaiveTime::parse_from_str(&self.alarm_time, TIME_FORMAT)
            .map_err(|_| AlarmError::InvalidTime(self.alarm_time.clone()))?;
        let repeat_days = RepeatDays::new(self.repeat_days)?;

        if self.is_snoozing && self.snooze_until_timestamp.is_none() {
            warn!(
                "Alarm '{}' (ID: {}) is marked snoozing without a deadline. Ignoring the flag.",
                self.label, self.alarm_id
            );
        }
        let state = match (self.enabled, self.snooze_until_timestamp) {
            (false, _) => AlarmState::Disabled,
            (true, None) => AlarmState::Armed,
            (true, Some(seconds)) => match from_epoch_seconds(seconds) {
                Some(until) => AlarmState::Snoozing { until },
                None => AlarmState::Armed,
            },
        };

        let mut alarm = Alarm::from_parts(
            self.alarm_id,
            time_of_day,
            self.label,
            repeat_days,
            FeedSpec::new(self.feed_type, self.feed_options),
            state,
        );
        alarm.clear_stale_snooze(now);
        Ok(alarm)
    }
}

/// Serialises every alarm with its full field set.
pub fn encode_alarms<'a, I>(alarms: I) -> Result<Vec<u8>, CodecError>
where
    I: IntoIterator<Item = &'a Alarm>,
{
    let records: Vec<AlarmRecord> = alarms.into_iter().map(AlarmRecord::from).collect();
    serde_json::to_vec_pretty(&records).map_err(CodecError::Encode)
}

/// Parses a stored collection.
///
/// Fails only when the data is not a JSON array at all. Individual records
/// that cannot be parsed are skipped and listed in the report.
pub fn decode_alarms(data: &[u8], now: DateTime<Local>) -> Result<DecodeReport, CodecError> {
    let raw: Vec<Value> = serde_json::from_slice(data).map_err(CodecError::Malformed)?;
    let mut report = DecodeReport {
        total: raw.len(),
        ..Default::default()
    };

    for (index, value) in raw.into_iter().enumerate() {
        let parsed = serde_json::from_value::<AlarmRecord>(value)
            .map_err(|e| e.to_string())
            .and_then(|record| record.into_alarm(now).map_err(|e| e.to_string()));
        match parsed {
            Ok(alarm) => report.alarms.push(alarm),
            Err(reason) => {
                error!("Error loading alarm record #{}: {}", index, reason);
                report.skipped.push(format!("record #{index}: {reason}"));
            }
        }
    }

    info!(
        "{} of {} alarm records loaded.",
        report.alarms.len(),
        report.total
    );
    Ok(report)
}
