//! WebSocket Session Management
//!
//! This module contains the logic for handling voice and chat sessions over
//! WebSockets. It is structured into submodules for clarity:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle and the UI-side callbacks.
//! - `events`: Translates realtime server events into session updates.
//! - `provider`: Handles the connection to the hosted realtime model.

pub mod events;
pub mod protocol;
mod provider;
pub mod session;

pub use session::ws_handler;
