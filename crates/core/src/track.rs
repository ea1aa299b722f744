use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one playback stream on the client.
///
/// Every audio chunk sent to the browser is tagged with the current track. When
/// the user interrupts or sends a new message the session switches to a fresh
/// track, and the player drops anything still queued on the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Replaces this track with a fresh one and returns the new value.
    pub fn regenerate(&mut self) -> TrackId {
        *self = TrackId::new();
        *self
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
