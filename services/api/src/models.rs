//! API Models
//!
//! This module defines the chat message model shown in the UI and the payloads
//! of the REST endpoints, annotated for OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use deco_core::gate::InputChannel;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    AssistantMessage,
    UserMessage,
    SystemMessage,
    ErrorMessage,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::AssistantMessage => write!(f, "assistant_message"),
            MessageKind::UserMessage => write!(f, "user_message"),
            MessageKind::SystemMessage => write!(f, "system_message"),
            MessageKind::ErrorMessage => write!(f, "error_message"),
        }
    }
}

/// Extra information attached to a chat message.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq)]
pub struct MessageMetadata {
    /// Message origin, e.g. `audio_transcript`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// `text` or `voice`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "voice")]
    pub input_method: Option<InputChannel>,
}

impl MessageMetadata {
    /// Metadata for a user turn transcribed from speech.
    pub fn audio_transcript() -> Self {
        Self {
            kind: Some("audio_transcript".to_string()),
            input_method: Some(InputChannel::Voice),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ChatMessage {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub author: String,
    #[schema(value_type = String, example = "assistant_message")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    pub created_at: DateTime<Utc>,
}

pub const ASSISTANT_AUTHOR: &str = "Assistant";
pub const USER_AUTHOR: &str = "You";

impl ChatMessage {
    fn build(author: &str, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author: author.to_string(),
            kind,
            content: content.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(ASSISTANT_AUTHOR, MessageKind::AssistantMessage, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::build(ASSISTANT_AUTHOR, MessageKind::SystemMessage, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::build(ASSISTANT_AUTHOR, MessageKind::ErrorMessage, content)
    }

    /// A user turn that was spoken rather than typed.
    pub fn voice_transcript(content: impl Into<String>) -> Self {
        Self {
            metadata: Some(MessageMetadata::audio_transcript()),
            ..Self::build(USER_AUTHOR, MessageKind::UserMessage, content)
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub deployment: String,
}

/// A tool the realtime model may call.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ToolSummary {
    #[schema(example = "schedule_callback")]
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's arguments.
    #[schema(value_type = Object)]
    pub parameters: serde_json::Value,
}
