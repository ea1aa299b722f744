//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources created once at startup.

use crate::config::Config;
use deco_core::prompt::SystemPrompt;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub system_prompt: SystemPrompt,
    pub config: Arc<Config>,
}
