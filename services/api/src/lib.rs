//! Deco Assistant API Library Crate
//!
//! This library contains all the core logic for the assistant web service,
//! including the application state, REST handlers, WebSocket session logic,
//! the realtime model client, and routing. The `api` binary is a thin wrapper
//! around this library.

pub mod audio_utils;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
