//! Conversation message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sent to the completion service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Who spoke a turn of the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Assistant,
}

impl Speaker {
    /// Prefix used when a transcript is rendered for display
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Human => "User",
            Speaker::Assistant => "AI",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::Human => write!(f, "human"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged entry of the short-term transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub text: String,
}

impl Turn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Human,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            text: text.into(),
        }
    }

    /// Convert to the message shape the completion service expects
    pub fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            Speaker::Human => ChatMessage::user(self.text.clone()),
            Speaker::Assistant => ChatMessage::assistant(self.text.clone()),
        }
    }
}

/// A committed exchange: what the user said and what the assistant answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub human: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    pub fn new(human: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            human: human.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
        }
    }

    /// The exchange as two turns, human first
    pub fn turns(&self) -> [Turn; 2] {
        [
            Turn::human(self.human.clone()),
            Turn::assistant(self.assistant.clone()),
        ]
    }
}

/// Summary of token usage for the current transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Total tokens used
    pub total: u32,

    /// Tokens used by human turns
    pub human: u32,

    /// Tokens used by assistant turns
    pub assistant: u32,
}

impl TokenUsage {
    /// Add tokens for a speaker
    pub fn add(&mut self, role: Speaker, tokens: u32) {
        self.total += tokens;
        match role {
            Speaker::Human => self.human += tokens,
            Speaker::Assistant => self.assistant += tokens,
        }
    }
}
