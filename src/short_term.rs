//! Short-term memory: the in-process transcript of the current session

use crate::embedding::TokenCounter;
use crate::message::{ChatMessage, Exchange, TokenUsage, Turn};

/// Ordered exchanges of the active session, oldest first. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ShortTermMemory {
    exchanges: Vec<Exchange>,
}

impl ShortTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one human/assistant exchange
    pub fn append(&mut self, human: impl Into<String>, assistant: impl Into<String>) {
        self.exchanges.push(Exchange::new(human, assistant));
    }

    /// Flattened role-tagged transcript, alternating human/assistant
    pub fn history(&self) -> Vec<Turn> {
        self.exchanges.iter().flat_map(Exchange::turns).collect()
    }

    /// The transcript as role-tagged completion-service messages
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.history().iter().map(Turn::to_chat_message).collect()
    }

    /// Number of committed exchanges
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Token usage of the transcript
    pub fn token_usage(&self, counter: Option<&TokenCounter>) -> TokenUsage {
        let mut usage = TokenUsage::default();
        for turn in self.history() {
            let tokens = match counter {
                Some(counter) => counter.count(&turn.text),
                None => TokenCounter::estimate(&turn.text),
            };
            usage.add(turn.role, tokens);
        }
        usage
    }

    /// Drop the whole transcript
    pub fn clear(&mut self) {
        self.exchanges.clear();
    }
}
