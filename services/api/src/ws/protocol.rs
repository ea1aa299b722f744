//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! JSON text frames carry the messages below. Binary frames are raw PCM16
//! little-endian mono microphone audio and are treated like `audio_chunk`.

use crate::models::{ChatMessage, MessageMetadata};
use deco_core::{gate::InputChannel, track::TrackId};
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A chat message typed by the user.
    UserMessage {
        content: String,
        #[serde(default)]
        metadata: Option<MessageMetadata>,
    },
    /// The microphone was switched on.
    AudioStart {
        /// Rate of the PCM16 audio the client will send. Defaults to 24 kHz.
        #[serde(default)]
        sample_rate: Option<u32>,
    },
    /// A base64-encoded PCM16 microphone chunk.
    AudioChunk { data: String },
    /// The microphone was switched off.
    AudioEnd,
    /// The user pressed stop.
    Stop,
}

impl ClientMessage {
    /// Provenance of a chat message. Messages are typed text unless the
    /// client marks them as voice.
    pub fn input_channel(metadata: Option<&MessageMetadata>) -> InputChannel {
        metadata
            .and_then(|m| m.input_method)
            .unwrap_or(InputChannel::Text)
    }
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A chat message to append to the conversation.
    Message(ChatMessage),
    /// A chunk of the assistant's voice (base64 PCM16) for one playback track.
    AudioChunk {
        mime_type: String,
        data: String,
        track: TrackId,
    },
    /// Stop playback of everything queued so far.
    AudioInterrupt,
    /// Result of an `audio_start` request.
    AudioStarted { connected: bool },
    /// Reports a protocol error to the client.
    Error { message: String },
}

impl ServerMessage {
    pub fn pcm16_chunk(data: String, track: TrackId) -> Self {
        ServerMessage::AudioChunk {
            mime_type: "pcm16".to_string(),
            data,
            track,
        }
    }
}
