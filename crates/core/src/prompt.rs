//! Onboarding Prompt
//!
//! The assistant's behaviour is driven by a natural-language step script. The
//! script itself lives in `prompts/system_prompt.md`; this module only joins it
//! with the per-session customer line and holds the fixed strings the session
//! posts on its own.

use std::sync::Arc;

/// First chat message shown when a session opens.
pub const WELCOME_MESSAGE: &str =
    "Hi, Welcome to Deco AI. Press the 'microphone' button below to talk!";

/// Sent to the model as a user turn right after the voice connection opens so
/// the assistant greets the user out loud.
pub const VOICE_GREETING: &str = "Now let's start configuring the journey, this will only take a few minutes. You can control me directly through conversation to complete the setup, and feel free to ask me any questions at any time.";

/// Shown when a chat message arrives before voice mode is active.
pub const VOICE_MODE_REQUIRED: &str = "Please activate voice mode before sending messages!";

/// The onboarding step script shared by every session.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    script: Arc<String>,
}

impl SystemPrompt {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: Arc::new(script.into()),
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// Builds the session instructions for one customer.
    pub fn instructions_for(&self, customer_id: &str) -> String {
        format!("{}\n\n Customer ID: {}", self.script, customer_id)
    }
}
