//! Translation of realtime server events into session updates.
//!
//! The provider task feeds every event it receives through [`translate`]; the
//! session loop then applies the resulting [`RealtimeUpdate`] to its state and
//! to the browser. Events the session does not care about, and events missing
//! the fields it needs, translate to `None`.

use async_openai::types::realtime::{Item, ItemType, ServerEvent as OAIServerEvent};

/// What the session has to react to after a realtime server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeUpdate {
    /// A base64 PCM16 chunk of the assistant's voice.
    AudioDelta(String),
    /// An assistant output item finished with a non-empty transcript.
    ItemCompleted { transcript: String },
    /// The user started speaking over the assistant.
    Interrupted,
    /// The user's speech was transcribed.
    InputTranscription { transcript: String },
    /// The model wants a tool invoked.
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// The realtime API reported an error.
    Error(String),
}

/// Maps one realtime server event to the update the session should apply.
pub fn translate(event: OAIServerEvent) -> Option<RealtimeUpdate> {
    match event {
        OAIServerEvent::ResponseAudioDelta(e) => Some(RealtimeUpdate::AudioDelta(e.delta)),
        OAIServerEvent::ResponseOutputItemDone(e) => completed_item(e.item),
        OAIServerEvent::InputAudioBufferSpeechStarted(_) => Some(RealtimeUpdate::Interrupted),
        OAIServerEvent::ConversationItemInputAudioTranscriptionCompleted(e) => {
            Some(RealtimeUpdate::InputTranscription {
                transcript: e.transcript,
            })
        }
        OAIServerEvent::Error(e) => Some(RealtimeUpdate::Error(e.error.message)),
        _ => None,
    }
}

fn completed_item(item: Item) -> Option<RealtimeUpdate> {
    match item.r#type {
        Some(ItemType::FunctionCall) => Some(RealtimeUpdate::ToolCall {
            call_id: item.call_id?,
            name: item.name?,
            arguments: item.arguments.unwrap_or_else(|| "{}".to_string()),
        }),
        Some(ItemType::Message) => {
            let transcript = item.content?.into_iter().find_map(|part| {
                part.transcript
                    .filter(|t| !t.is_empty())
                    .or(part.text.filter(|t| !t.is_empty()))
            })?;
            Some(RealtimeUpdate::ItemCompleted { transcript })
        }
        _ => None,
    }
}
