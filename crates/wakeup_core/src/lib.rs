pub mod codec;
pub mod domain;
pub mod error;
pub mod feed;
pub mod manager;
pub mod ports;

pub use codec::{decode_alarms, encode_alarms, AlarmRecord, CodecError, DecodeReport};
pub use domain::{
    parse_time_of_day, Alarm, AlarmId, AlarmState, AlarmUpdate, FeedKind, FeedOptions, FeedSpec,
    NewAlarm, RepeatDays, TriggerCause,
};
pub use error::AlarmError;
pub use feed::{check_feed_length, FeedPrompt, FeedSettings, MAX_FEED_WORDS};
pub use manager::AlarmManager;
pub use ports::{
    AlarmStore, AudioClip, AudioPlaybackService, FeedGenerationService, PlaybackOutcome, PortError,
    PortResult, TextToSpeechService,
};
