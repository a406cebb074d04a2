//! Recall results and history budgeting for prompt assembly

use crate::embedding::TokenCounter;
use crate::memory::{RecordId, RecordMetadata};
use crate::message::Turn;
use crate::storage::ScoredEntry;

/// Text handed back when a memory query finds nothing
pub const NO_RELEVANT_MEMORY: &str = "No relevant memory found.";

/// A record that was retrieved with its relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct RecalledMemory {
    pub id: RecordId,
    pub text: String,
    pub metadata: RecordMetadata,
    pub score: f32,
}

impl From<ScoredEntry> for RecalledMemory {
    fn from(entry: ScoredEntry) -> Self {
        Self {
            id: entry.id,
            text: entry.text,
            metadata: entry.metadata,
            score: entry.score,
        }
    }
}

/// Outcome of a fact query. An empty result is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FactRecall {
    Found(Vec<RecalledMemory>),
    NoRelevantMemory,
}

impl FactRecall {
    pub fn from_hits(hits: Vec<RecalledMemory>) -> Self {
        if hits.is_empty() {
            FactRecall::NoRelevantMemory
        } else {
            FactRecall::Found(hits)
        }
    }

    pub fn hits(&self) -> &[RecalledMemory] {
        match self {
            FactRecall::Found(hits) => hits,
            FactRecall::NoRelevantMemory => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits().is_empty()
    }
}

impl std::fmt::Display for FactRecall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactRecall::NoRelevantMemory => write!(f, "{}", NO_RELEVANT_MEMORY),
            FactRecall::Found(hits) => {
                write!(f, "From my memory:")?;
                for hit in hits {
                    write!(f, "\n- {}", hit.text)?;
                }
                Ok(())
            }
        }
    }
}

/// Format document search hits for a tool result
pub fn format_document_hits(hits: &[RecalledMemory]) -> String {
    if hits.is_empty() {
        return "No relevant information found in knowledge base.".to_string();
    }

    let mut out = String::from("--- Relevant Information ---\n");
    for (i, hit) in hits.iter().enumerate() {
        let source = hit.metadata.source.as_deref().unwrap_or("unknown source");
        out.push_str(&format!("Result {} ({}):\n{}\n\n", i + 1, source, hit.text));
    }
    out.trim_end().to_string()
}

/// Render a transcript as `User:` / `AI:` lines. Display only.
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Token budget for the history sent with a completion request
pub struct HistoryBudget {
    pub limit: u32,
    pub used: u32,
}

impl HistoryBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Get remaining tokens
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Keep the most recent turns that fit, dropping whole exchanges from the
    /// oldest end so a human turn is never separated from its answer.
    pub fn fit<'a>(&mut self, turns: &'a [Turn], counter: Option<&TokenCounter>) -> &'a [Turn] {
        let count = |text: &str| match counter {
            Some(counter) => counter.count(text),
            None => TokenCounter::estimate(text),
        };

        let mut start = turns.len();
        while start > 0 {
            let candidate = start.saturating_sub(2);
            let cost: u32 = turns[candidate..start].iter().map(|t| count(&t.text)).sum();
            if cost > self.remaining() {
                break;
            }
            self.used += cost;
            start = candidate;
        }
        &turns[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordKind;
    use uuid::Uuid;

    fn hit(text: &str, source: Option<&str>) -> RecalledMemory {
        let mut metadata = RecordMetadata::new("session_1", RecordKind::Document);
        metadata.source = source.map(str::to_string);
        RecalledMemory {
            id: Uuid::new_v4(),
            text: text.to_string(),
            metadata,
            score: 0.9,
        }
    }

    #[test]
    fn empty_recall_is_the_sentinel() {
        let recall = FactRecall::from_hits(Vec::new());
        assert_eq!(recall, FactRecall::NoRelevantMemory);
        assert_eq!(recall.to_string(), NO_RELEVANT_MEMORY);
    }

    #[test]
    fn found_recall_lists_texts() {
        let recall = FactRecall::from_hits(vec![hit("I like pizza", None)]);
        assert_eq!(recall.to_string(), "From my memory:\n- I like pizza");
    }

    #[test]
    fn document_hits_name_their_source() {
        let text = format_document_hits(&[hit("Rust is fast.", Some("notes.txt"))]);
        assert!(text.contains("Result 1 (notes.txt):\nRust is fast."));
        assert_eq!(
            format_document_hits(&[]),
            "No relevant information found in knowledge base."
        );
    }

    #[test]
    fn transcript_rendering_uses_labels() {
        let turns = vec![Turn::human("hi"), Turn::assistant("hello")];
        assert_eq!(render_transcript(&turns), "User: hi\nAI: hello");
    }

    #[test]
    fn budget_drops_oldest_exchanges_first() {
        let turns = vec![
            Turn::human("a".repeat(40)),
            Turn::assistant("b".repeat(40)),
            Turn::human("c".repeat(8)),
            Turn::assistant("d".repeat(8)),
        ];
        // each 40-char turn estimates to 10 tokens, each 8-char turn to 2
        let mut budget = HistoryBudget::new(10);
        let kept = budget.fit(&turns, None);
        assert_eq!(kept, &turns[2..]);
        assert_eq!(budget.used, 4);

        let mut roomy = HistoryBudget::new(100);
        assert_eq!(roomy.fit(&turns, None).len(), 4);
    }
}
