pub mod alarm_file;
pub mod console_button;
pub mod feed_llm;
pub mod offline;
pub mod player;
pub mod tts;

pub use alarm_file::JsonFileAlarmStore;
pub use console_button::ButtonPress;
pub use feed_llm::OpenAiFeedAdapter;
pub use offline::OfflineAdapter;
pub use player::{CommandPlayer, SimulatedPlayer};
pub use tts::OpenAiTtsAdapter;
