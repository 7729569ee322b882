use super::{Conversation, DisplayMessage};
use crate::conversion::TextArtifact;
use crate::settings::ChatSettings;

/// Builds the initial conversation for a session from its artifact
#[derive(Debug, Clone)]
pub struct ChatSessionSeeder {
    instruction: String,
    placeholder: String,
    welcome: String,
}

/// Fresh conversation and display history
#[derive(Debug, Clone)]
pub struct SeededChat {
    pub conversation: Conversation,
    pub display: Vec<DisplayMessage>,
}

impl ChatSessionSeeder {
    pub fn new(
        instruction: impl Into<String>,
        placeholder: impl Into<String>,
        welcome: impl Into<String>,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            placeholder: placeholder.into(),
            welcome: welcome.into(),
        }
    }

    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self::new(
            settings.system_instruction.clone(),
            settings.placeholder.clone(),
            settings.welcome_message.clone(),
        )
    }

    /// System prompt with the artifact text substituted for the placeholder.
    /// Without a placeholder the text is appended so it is always present.
    pub fn system_prompt(&self, text: &str) -> String {
        if !self.placeholder.is_empty() && self.instruction.contains(&self.placeholder) {
            self.instruction.replacen(&self.placeholder, text, 1)
        } else if self.instruction.is_empty() {
            text.to_string()
        } else {
            format!("{}\n\n{}", self.instruction, text)
        }
    }

    pub fn seed(&self, artifact: &TextArtifact) -> SeededChat {
        SeededChat {
            conversation: Conversation::new(self.system_prompt(&artifact.content)),
            display: vec![DisplayMessage::ai(self.welcome.clone())],
        }
    }
}
