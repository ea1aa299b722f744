//! Workflow Gate
//!
//! The onboarding script only moves to its next step when the user issues a
//! typed command beginning with [`SYSTEM_ORDER_MARKER`]. Speech is never allowed
//! to do so, even when the transcript reads exactly like a command, so the gate
//! decides on the *channel* an input arrived through before it looks at content.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal prefix that marks a typed message as a workflow command.
pub const SYSTEM_ORDER_MARKER: &str = "SYSTEM ORDER";

/// Notice posted when a spoken command is refused.
pub const VOICE_COMMAND_NOTICE: &str =
    "Please use text input for system operation commands; voice only supports general Q&A.";

/// Where a user input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputChannel {
    /// Typed into the chat box.
    Text,
    /// Transcribed from the microphone stream.
    Voice,
}

impl fmt::Display for InputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputChannel::Text => write!(f, "text"),
            InputChannel::Voice => write!(f, "voice"),
        }
    }
}

/// A single user input together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInput {
    pub channel: InputChannel,
    pub content: String,
}

impl UserInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            channel: InputChannel::Text,
            content: content.into(),
        }
    }

    pub fn voice(content: impl Into<String>) -> Self {
        Self {
            channel: InputChannel::Voice,
            content: content.into(),
        }
    }

    /// True when the trimmed content begins with the command marker,
    /// regardless of channel.
    pub fn carries_marker(&self) -> bool {
        self.content.trim().starts_with(SYSTEM_ORDER_MARKER)
    }
}

/// What the session should do with an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// A typed command: forward it so the assistant may move to the next step.
    AdvanceWorkflow,
    /// A spoken question or remark: forward it for general Q&A.
    GeneralChat,
    /// A spoken command: do not forward, tell the user to type it instead.
    RejectVoiceCommand,
    /// Nothing to act on: blank input, or typed text that is not a command.
    Ignore,
}

impl GateDecision {
    /// Whether the input should be sent on to the realtime model.
    pub fn forwards(self) -> bool {
        matches!(self, GateDecision::AdvanceWorkflow | GateDecision::GeneralChat)
    }
}

/// Classifies an input. `AdvanceWorkflow` is returned only for
/// [`InputChannel::Text`].
///
/// The chat box is a command line: typed text reaches the model only when it
/// is a command. Free-form conversation happens by voice.
pub fn evaluate(input: &UserInput) -> GateDecision {
    if input.content.trim().is_empty() {
        return GateDecision::Ignore;
    }
    match (input.channel, input.carries_marker()) {
        (InputChannel::Text, true) => GateDecision::AdvanceWorkflow,
        (InputChannel::Text, false) => GateDecision::Ignore,
        (InputChannel::Voice, true) => GateDecision::RejectVoiceCommand,
        (InputChannel::Voice, false) => GateDecision::GeneralChat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "SYSTEM ORDER",
        "SYSTEM ORDER next step",
        "   SYSTEM ORDER I agree",
        "\tSYSTEM ORDER\n",
        "system order next step",
        "SYSTEM  ORDER next",
        "please SYSTEM ORDER next",
        "How many Deco units do I need?",
        "I agree.",
        "SYSTEM",
        " ",
        "",
    ];

    #[test]
    fn test_advance_iff_text_and_marker() {
        for sample in SAMPLES {
            for input in [UserInput::text(*sample), UserInput::voice(*sample)] {
                let advanced = evaluate(&input) == GateDecision::AdvanceWorkflow;
                let expected = input.channel == InputChannel::Text
                    && sample.trim().starts_with(SYSTEM_ORDER_MARKER);
                assert_eq!(advanced, expected, "input: {:?}", input);
            }
        }
    }

    #[test]
    fn test_voice_never_advances_even_with_verbatim_marker() {
        let input = UserInput::voice(SYSTEM_ORDER_MARKER);
        assert_eq!(evaluate(&input), GateDecision::RejectVoiceCommand);
        assert!(!evaluate(&input).forwards());
    }

    #[test]
    fn test_text_command_advances() {
        let input = UserInput::text("  SYSTEM ORDER I allow ");
        assert_eq!(evaluate(&input), GateDecision::AdvanceWorkflow);
        assert!(evaluate(&input).forwards());
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        assert_eq!(
            evaluate(&UserInput::text("system order continue")),
            GateDecision::Ignore
        );
    }

    #[test]
    fn test_typed_text_without_marker_is_dropped() {
        for sample in ["I agree.", "How many Deco units do I need?", "SYSTEM"] {
            let decision = evaluate(&UserInput::text(sample));
            assert_eq!(decision, GateDecision::Ignore, "input: {:?}", sample);
            assert!(!decision.forwards());
        }
    }

    #[test]
    fn test_spoken_question_is_general_chat() {
        let decision = evaluate(&UserInput::voice("How many Deco units do I need?"));
        assert_eq!(decision, GateDecision::GeneralChat);
        assert!(decision.forwards());
    }

    #[test]
    fn test_marker_must_be_prefix() {
        assert_eq!(
            evaluate(&UserInput::text("Can you SYSTEM ORDER for me?")),
            GateDecision::Ignore
        );
        assert_eq!(
            evaluate(&UserInput::voice("what does SYSTEM ORDER mean")),
            GateDecision::GeneralChat
        );
    }

    #[test]
    fn test_blank_input_is_ignored() {
        assert_eq!(evaluate(&UserInput::text("   ")), GateDecision::Ignore);
        assert_eq!(evaluate(&UserInput::voice("")), GateDecision::Ignore);
        assert!(!GateDecision::Ignore.forwards());
    }

    #[test]
    fn test_channel_display_and_serde() {
        assert_eq!(InputChannel::Text.to_string(), "text");
        assert_eq!(InputChannel::Voice.to_string(), "voice");
        let parsed: InputChannel = serde_json::from_str("\"voice\"").unwrap();
        assert_eq!(parsed, InputChannel::Voice);
    }
}
