//! services/wakeup/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::driver::ControlHandle;
use std::sync::Arc;
use wakeup_core::manager::AlarmManager;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AlarmManager>,
    pub control: ControlHandle,
    pub config: Arc<Config>,
}
