//! services/wakeup/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub alarms_file_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub feed_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub news_article_count: usize,
    pub tick_interval: Duration,
    pub max_playback: Duration,
    pub default_snooze_minutes: u32,
    /// External player invocation, e.g. `mpg123 -q`. `None` selects the simulated player.
    pub audio_player_command: Option<String>,
    pub audio_dir: PathBuf,
    pub default_alarm_sound_path: Option<PathBuf>,
    pub console_button: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // --- Server Settings ---
        let bind_address = parse_or(&var, "BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 8000)))?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let alarms_file_path = var("ALARMS_FILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./alarms.json"));

        // --- Load API Keys (as optional) ---
        let openai_api_key = var("OPENAI_API_KEY");

        // --- Load Adapter-specific Settings ---
        let feed_model = var("FEED_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let tts_model = var("TTS_MODEL").unwrap_or_else(|| "tts-1".to_string());
        let tts_voice = var("TTS_VOICE").unwrap_or_else(|| "alloy".to_string());
        let news_article_count = parse_or(&var, "FEEDS_NEWS_ARTICLE_COUNT", 5usize)?;

        // --- Scheduling and Playback ---
        let tick_secs = parse_or(&var, "TICK_INTERVAL_SECS", 1u64)?;
        if tick_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "TICK_INTERVAL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let max_playback_secs = parse_or(&var, "MAX_PLAYBACK_SECS", 300u64)?;
        let default_snooze_minutes = parse_or(&var, "DEFAULT_SNOOZE_MINUTES", 9u32)?;
        if default_snooze_minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_SNOOZE_MINUTES".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let audio_player_command = var("AUDIO_PLAYER_COMMAND");
        let audio_dir = var("AUDIO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./audio_cache"));
        let default_alarm_sound_path = var("DEFAULT_ALARM_SOUND_PATH").map(PathBuf::from);
        let console_button = parse_or(&var, "CONSOLE_BUTTON", false)?;

        Ok(Self {
            bind_address,
            log_level,
            alarms_file_path,
            openai_api_key,
            feed_model,
            tts_model,
            tts_voice,
            news_article_count,
            tick_interval: Duration::from_secs(tick_secs),
            max_playback: Duration::from_secs(max_playback_secs),
            default_snooze_minutes,
            audio_player_command,
            audio_dir,
            default_alarm_sound_path,
            console_button,
        })
    }

    /// Returns the OpenAI key, or `MissingVar` when none is configured.
    pub fn require_openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))
    }
}

/// Parses `name` when set, otherwise yields `default`.
fn parse_or<T, V>(var: &V, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.alarms_file_path, PathBuf::from("./alarms.json"));
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.feed_model, "gpt-4o-mini");
        assert_eq!(config.tts_model, "tts-1");
        assert_eq!(config.tts_voice, "alloy");
        assert_eq!(config.news_article_count, 5);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.max_playback, Duration::from_secs(300));
        assert_eq!(config.default_snooze_minutes, 9);
        assert!(config.audio_player_command.is_none());
        assert!(config.default_alarm_sound_path.is_none());
        assert!(!config.console_button);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("RUST_LOG", "debug"),
            ("OPENAI_API_KEY", "sk-test"),
            ("TICK_INTERVAL_SECS", "5"),
            ("DEFAULT_SNOOZE_MINUTES", "10"),
            ("AUDIO_PLAYER_COMMAND", "mpg123 -q"),
            ("CONSOLE_BUTTON", "true"),
        ])
        .unwrap();
        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert_eq!(config.default_snooze_minutes, 10);
        assert_eq!(config.audio_player_command.as_deref(), Some("mpg123 -q"));
        assert!(config.console_button);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("OPENAI_API_KEY", "  "), ("TTS_VOICE", "")]).unwrap();
        assert!(config.openai_api_key.is_none());
        assert!(matches!(
            config.require_openai_key(),
            Err(ConfigError::MissingVar(name)) if name == "OPENAI_API_KEY"
        ));
        assert_eq!(config.tts_voice, "alloy");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("BIND_ADDRESS", "not-an-address")]),
            Err(ConfigError::InvalidValue(name, _)) if name == "BIND_ADDRESS"
        ));
        assert!(matches!(
            load(&[("RUST_LOG", "chatty")]),
            Err(ConfigError::InvalidValue(name, _)) if name == "RUST_LOG"
        ));
        assert!(matches!(
            load(&[("TICK_INTERVAL_SECS", "0")]),
            Err(ConfigError::InvalidValue(name, _)) if name == "TICK_INTERVAL_SECS"
        ));
    }
}
