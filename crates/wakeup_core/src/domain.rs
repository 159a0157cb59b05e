//! crates/wakeup_core/src/domain.rs
//!
//! Defines the pure, core data structures for the alarm engine.
//! These structs are independent of the persisted file layout; see `codec` for that.
//!
//! # Alarm state machine
//!
//! ```text
//!              enable()                    snooze(d, now)
//!  Disabled ────────────► Armed ───────────────────────► Snoozing { until }
//!     ▲                    │  ▲                                │
//!     │     disable()      │  │   take_trigger(now >= until)   │
//!     └────────────────────┘  └────────────────────────────────┘
//!     ▲                                                        │
//!     └──────────────────────── disable() ─────────────────────┘
//! ```
//!
//! Disabling always cancels a pending snooze, so a disabled alarm can never
//! carry a snooze deadline.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, SubsecRound, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AlarmError;

pub type AlarmId = String;

/// Arbitrary string-keyed feed options, opaque to the engine.
pub type FeedOptions = Map<String, Value>;

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Parses a wall-clock time given as `HH:MM:SS` or `HH:MM`.
pub fn parse_time_of_day(text: &str) -> Result<NaiveTime, AlarmError> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|_| AlarmError::InvalidTime(text.to_string()))
}

//=========================================================================================
// Repeat days
//=========================================================================================

/// The weekdays an alarm repeats on, Monday = 0 through Sunday = 6.
///
/// Always deduplicated and iterated in ascending order. Empty means the
/// alarm is a one-time alarm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepeatDays(BTreeSet<u8>);

impl RepeatDays {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<I>(days: I) -> Result<Self, AlarmError>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut set = BTreeSet::new();
        for day in days {
            let checked = u8::try_from(day)
                .ok()
                .filter(|d| *d <= 6)
                .ok_or(AlarmError::InvalidRepeatDay(day))?;
            set.insert(checked);
        }
        Ok(Self(set))
    }

    pub fn from_weekdays<I>(days: I) -> Self
    where
        I: IntoIterator<Item = Weekday>,
    {
        Self(
            days.into_iter()
                .map(|d| d.num_days_from_monday() as u8)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0.contains(&(day.num_days_from_monday() as u8))
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl fmt::Display for RepeatDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("One-time");
        }
        let names: Vec<&str> = self.iter().map(|d| DAY_NAMES[usize::from(d)]).collect();
        f.write_str(&names.join(", "))
    }
}

//=========================================================================================
// Feeds
//=========================================================================================

/// The kind of spoken content an alarm plays.
///
/// Unknown tags are kept as [`FeedKind::Other`] so they survive a round
/// trip through the alarms file; they fail when content is generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FeedKind {
    #[default]
    DailyNews,
    TopicFacts,
    CustomPrompt,
    Other(String),
}

impl FeedKind {
    pub const KNOWN: [FeedKind; 3] = [Self::DailyNews, Self::TopicFacts, Self::CustomPrompt];

    pub fn as_str(&self) -> &str {
        match self {
            Self::DailyNews => "daily_news",
            Self::TopicFacts => "topic_facts",
            Self::CustomPrompt => "custom_prompt",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for FeedKind {
    fn from(tag: &str) -> Self {
        match tag.trim() {
            "daily_news" => Self::DailyNews,
            "topic_facts" => Self::TopicFacts,
            "custom_prompt" => Self::CustomPrompt,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for FeedKind {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<FeedKind> for String {
    fn from(kind: FeedKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an alarm plays: a feed kind plus its options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSpec {
    pub kind: FeedKind,
    pub options: FeedOptions,
}

impl FeedSpec {
    pub fn new(kind: impl Into<FeedKind>, options: FeedOptions) -> Self {
        Self {
            kind: kind.into(),
            options,
        }
    }

    /// Returns a string option, ignoring blank values.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

//=========================================================================================
// Alarm
//=========================================================================================

/// The trigger-relevant state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Disabled,
    /// Enabled and waiting for its scheduled minute.
    Armed,
    /// Enabled, with the next ring deferred to `until`.
    Snoozing { until: DateTime<Local> },
}

/// Why an alarm reported itself as due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCause {
    /// The wall clock reached the alarm's minute on a matching day.
    Scheduled,
    /// A snooze deadline passed.
    SnoozeExpired,
}

/// A single alarm.
#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    pub id: AlarmId,
    pub time_of_day: NaiveTime,
    pub label: String,
    pub repeat_days: RepeatDays,
    pub feed: FeedSpec,
    state: AlarmState,
}

/// Everything needed to create an alarm. Fields left at their defaults give
/// an enabled one-time `daily_news` alarm with a generated id.
#[derive(Debug, Clone)]
pub struct NewAlarm {
    pub id: Option<AlarmId>,
    pub time_of_day: NaiveTime,
    pub label: String,
    pub repeat_days: RepeatDays,
    pub enabled: bool,
    pub feed: FeedSpec,
}

impl NewAlarm {
    pub fn new(time_of_day: NaiveTime, label: impl Into<String>) -> Self {
        Self {
            id: None,
            time_of_day,
            label: label.into(),
            repeat_days: RepeatDays::none(),
            enabled: true,
            feed: FeedSpec::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<AlarmId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn repeating(mut self, days: RepeatDays) -> Self {
        self.repeat_days = days;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_feed(mut self, feed: FeedSpec) -> Self {
        self.feed = feed;
        self
    }
}

/// A partial update; `None` fields are left untouched.
///
/// An empty `feed_options` map clears the options, `None` keeps them.
#[derive(Debug, Clone, Default)]
pub struct AlarmUpdate {
    pub time_of_day: Option<NaiveTime>,
    pub label: Option<String>,
    pub repeat_days: Option<RepeatDays>,
    pub enabled: Option<bool>,
    pub feed_kind: Option<FeedKind>,
    pub feed_options: Option<FeedOptions>,
}

impl Alarm {
    pub fn new(spec: NewAlarm) -> Self {
        let state = if spec.enabled {
            AlarmState::Armed
        } else {
            AlarmState::Disabled
        };
        Self {
            id: spec.id.unwrap_or_else(Self::generate_id),
            time_of_day: spec.time_of_day,
            label: spec.label,
            repeat_days: spec.repeat_days,
            feed: spec.feed,
            state,
        }
    }

    /// Rebuilds an alarm from stored parts. The state is taken as given;
    /// callers reconcile stale snoozes with [`Alarm::clear_stale_snooze`].
    pub(crate) fn from_parts(
        id: AlarmId,
        time_of_day: NaiveTime,
        label: String,
        repeat_days: RepeatDays,
        feed: FeedSpec,
        state: AlarmState,
    ) -> Self {
        Self {
            id,
            time_of_day,
            label,
            repeat_days,
            feed,
            state,
        }
    }

    pub fn generate_id() -> AlarmId {
        Uuid::new_v4().to_string()
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.state, AlarmState::Disabled)
    }

    pub fn is_snoozing(&self) -> bool {
        matches!(self.state, AlarmState::Snoozing { .. })
    }

    pub fn snooze_until(&self) -> Option<DateTime<Local>> {
        match self.state {
            AlarmState::Snoozing { until } => Some(until),
            _ => None,
        }
    }

    pub fn is_one_time(&self) -> bool {
        self.repeat_days.is_empty()
    }

    /// Arms the alarm and drops any snooze.
    pub fn enable(&mut self) {
        self.state = AlarmState::Armed;
        info!("Alarm '{}' (ID: {}) enabled.", self.label, self.id);
    }

    /// Disables the alarm and drops any snooze.
    pub fn disable(&mut self) {
        self.state = AlarmState::Disabled;
        info!("Alarm '{}' (ID: {}) disabled.", self.label, self.id);
    }

    /// Defers the next ring to `now + duration`.
    ///
    /// Fails with [`AlarmError::InvalidState`] when the alarm is disabled.
    /// Snoozing an already snoozing alarm moves the deadline.
    pub fn snooze(
        &mut self,
        duration: Duration,
        now: DateTime<Local>,
    ) -> Result<DateTime<Local>, AlarmError> {
        if !self.is_enabled() {
            warn!(
                "Cannot snooze alarm '{}' (ID: {}) as it is not enabled.",
                self.label, self.id
            );
            return Err(AlarmError::InvalidState(format!(
                "alarm '{}' is disabled and cannot be snoozed",
                self.id
            )));
        }
        // Deadlines are persisted with microsecond precision.
        let until = (now + duration).trunc_subsecs(6);
        self.state = AlarmState::Snoozing { until };
        info!(
            "Alarm '{}' (ID: {}) snoozed for {} minutes until {}.",
            self.label,
            self.id,
            duration.num_minutes(),
            until.format("%H:%M:%S")
        );
        Ok(until)
    }

    /// Applies a partial update. Setting `enabled` to false cancels a snooze.
    pub fn update(&mut self, changes: AlarmUpdate) {
        if let Some(time_of_day) = changes.time_of_day {
            self.time_of_day = time_of_day;
        }
        if let Some(label) = changes.label {
            self.label = label;
        }
        if let Some(repeat_days) = changes.repeat_days {
            self.repeat_days = repeat_days;
        }
        match changes.enabled {
            Some(false) => self.state = AlarmState::Disabled,
            Some(true) if self.state == AlarmState::Disabled => self.state = AlarmState::Armed,
            _ => {}
        }
        if let Some(kind) = changes.feed_kind {
            self.feed.kind = kind;
        }
        if let Some(options) = changes.feed_options {
            self.feed.options = options;
        }
        info!("Alarm '{}' (ID: {}) updated.", self.label, self.id);
    }

    /// True when `now` falls inside the alarm's scheduled minute on a day it
    /// rings. Ignores the enabled and snooze state.
    pub fn matches_schedule(&self, now: DateTime<Local>) -> bool {
        now.hour() == self.time_of_day.hour()
            && now.minute() == self.time_of_day.minute()
            && (self.repeat_days.is_empty() || self.repeat_days.contains(now.weekday()))
    }

    /// Reports whether the alarm should ring at `now` without changing it.
    pub fn is_due(&self, now: DateTime<Local>) -> Option<TriggerCause> {
        match self.state {
            AlarmState::Disabled => None,
            AlarmState::Snoozing { until } => (now >= until).then_some(TriggerCause::SnoozeExpired),
            AlarmState::Armed => self
                .matches_schedule(now)
                .then_some(TriggerCause::Scheduled),
        }
    }

    /// Moves a snoozing alarm whose deadline has been reached back to
    /// [`AlarmState::Armed`]. Returns whether that happened.
    pub fn expire_snooze_if_due(&mut self, now: DateTime<Local>) -> bool {
        match self.state {
            AlarmState::Snoozing { until } if now >= until => {
                self.state = AlarmState::Armed;
                true
            }
            _ => false,
        }
    }

    /// Evaluates the alarm for this tick, collapsing an expired snooze.
    ///
    /// Unlike [`Alarm::is_due`] this mutates: an expired snooze becomes
    /// `Armed` and is reported as [`TriggerCause::SnoozeExpired`].
    pub fn take_trigger(&mut self, now: DateTime<Local>) -> Option<TriggerCause> {
        if self.expire_snooze_if_due(now) {
            return Some(TriggerCause::SnoozeExpired);
        }
        match self.state {
            AlarmState::Armed if self.matches_schedule(now) => Some(TriggerCause::Scheduled),
            _ => None,
        }
    }

    /// Drops a snooze whose deadline is strictly before `now`. Used when
    /// alarms are loaded after the process was down. Returns whether the
    /// snooze was dropped.
    pub fn clear_stale_snooze(&mut self, now: DateTime<Local>) -> bool {
        match self.state {
            AlarmState::Snoozing { until } if until < now => {
                info!(
                    "Snooze time for alarm '{}' (ID: {}) has passed. Resetting snooze state.",
                    self.label, self.id
                );
                self.state = AlarmState::Armed;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            AlarmState::Disabled => "Disabled".to_string(),
            AlarmState::Armed => "Enabled".to_string(),
            AlarmState::Snoozing { until } => {
                format!("Enabled, Snoozing until {}", until.format("%H:%M:%S"))
            }
        };
        write!(
            f,
            "Alarm ID: {} - {} at {} ({}), State: {}, Feed: {}",
            self.id,
            self.label,
            self.time_of_day.format("%H:%M"),
            self.repeat_days,
            state,
            self.feed.kind
        )?;
        if !self.feed.options.is_empty() {
            write!(f, " ({})", Value::Object(self.feed.options.clone()))?;
        }
        Ok(())
    }
}
