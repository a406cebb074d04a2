//! The memory manager: one session, its transcript and the long-term store

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunking::TextChunker;
use crate::config::Config;
use crate::document::load_document;
use crate::embedding::{embedder_from_config, TokenCounter};
use crate::error::{Error, Result};
use crate::memory::{LongTermMemory, LongTermStats, RecordKind, RecordMetadata};
use crate::message::{ChatMessage, TokenUsage, Turn};
use crate::retrieval::{FactRecall, HistoryBudget, RecalledMemory};
use crate::session::{Session, SessionId, SessionStore};
use crate::short_term::ShortTermMemory;
use crate::storage::{open_index, RecordCatalog};

/// Outcome of adding a document to the knowledge base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub source: String,
    pub chunks: usize,
    /// The source was already catalogued and nothing was written
    pub skipped: bool,
}

/// Snapshot of everything the manager tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub session: Session,
    pub short_term_exchanges: usize,
    pub token_usage: TokenUsage,
    /// `None` when long-term memory is unavailable
    pub long_term: Option<LongTermStats>,
}

struct Conversation {
    session_id: SessionId,
    short_term: ShortTermMemory,
}

/// Owns the current session, its short-term transcript and a handle to
/// long-term memory.
///
/// Conversation-facing operations never fail: persistence problems are
/// logged and the conversation carries on.
pub struct MemoryManager {
    config: Config,
    sessions: SessionStore,
    conversation: Mutex<Conversation>,
    long_term: Option<LongTermMemory>,
    token_counter: Option<TokenCounter>,
    chunker: TextChunker,
}

impl MemoryManager {
    /// Assemble a manager from already-opened parts and start a session
    pub fn new(
        config: Config,
        sessions: SessionStore,
        long_term: Option<LongTermMemory>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = TextChunker::from_config(&config)?;

        let token_counter = match TokenCounter::for_gpt() {
            Ok(counter) => Some(counter),
            Err(e) => {
                warn!(error = %e, "tokenizer unavailable, estimating token counts");
                None
            }
        };

        let session_id = sessions
            .create_session()
            .unwrap_or_else(|degraded| degraded.into_session_id());

        if let Some(long_term) = &long_term {
            long_term.announce();
        }

        Ok(Self {
            config,
            sessions,
            conversation: Mutex::new(Conversation {
                session_id,
                short_term: ShortTermMemory::new(),
            }),
            long_term,
            token_counter,
            chunker,
        })
    }

    /// Open every store under the configured data directory.
    ///
    /// Long-term memory that cannot be set up leaves the manager running
    /// with short-term memory only.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        if let Err(e) = config.ensure_dirs() {
            warn!(data_dir = %config.data_dir.display(), error = %e, "could not create data directories");
        }

        let sessions = SessionStore::open(config.session_table_path());
        let long_term = match Self::open_long_term(&config).await {
            Ok(long_term) => Some(long_term),
            Err(e) => {
                warn!(error = %e, "long-term memory unavailable");
                None
            }
        };

        info!(data_dir = %config.data_dir.display(), "memory manager opened");
        Self::new(config, sessions, long_term)
    }

    async fn open_long_term(config: &Config) -> Result<LongTermMemory> {
        let embedder = embedder_from_config(config)?;
        let index = open_index(config).await?;
        let catalog = RecordCatalog::open(config.sqlite_path())?;
        Ok(LongTermMemory::new(embedder, index, catalog))
    }

    fn conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn long_term(&self) -> Option<&LongTermMemory> {
        self.long_term.as_ref()
    }

    pub fn current_session_id(&self) -> SessionId {
        self.conversation().session_id.clone()
    }

    /// Commit one exchange: append it to the transcript and count it against
    /// the session. A persistence failure is logged, never returned.
    pub fn record_turn(&self, human: &str, assistant: &str) {
        let session_id = {
            let mut conversation = self.conversation();
            conversation.short_term.append(human, assistant);
            conversation.session_id.clone()
        };

        if let Err(e) = self.sessions.increment_message_count(&session_id) {
            warn!(session_id = %session_id, error = %e, "turn recorded without persisting the message count");
        }
    }

    /// Store a fact in long-term memory and describe the outcome
    pub async fn save_fact(&self, text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return "Nothing to save: the text was empty.".to_string();
        }
        let Some(long_term) = &self.long_term else {
            return "Error saving to memory: long-term memory is unavailable".to_string();
        };

        let metadata = RecordMetadata::new(self.current_session_id(), RecordKind::Fact);
        match long_term.remember(text, metadata).await {
            Ok(id) => {
                info!(id = %id, "saved fact");
                format!("Saved to long term memory: {}", text)
            }
            Err(e) => {
                warn!(error = %e, "could not save fact");
                format!("Error saving to memory: {}", e)
            }
        }
    }

    /// Facts most similar to `text`
    pub async fn query_facts(&self, text: &str) -> FactRecall {
        let Some(long_term) = &self.long_term else {
            return FactRecall::NoRelevantMemory;
        };
        let hits = long_term
            .recall(text, self.config.recall_k, Some(RecordKind::Fact))
            .await;
        FactRecall::from_hits(hits)
    }

    /// The transcript of the current session, oldest first
    pub fn current_transcript(&self) -> Vec<Turn> {
        self.conversation().short_term.history()
    }

    /// The most recent transcript that fits the history token budget
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        let turns = self.current_transcript();
        let mut budget = HistoryBudget::new(self.config.history_token_budget);
        budget
            .fit(&turns, self.token_counter.as_ref())
            .iter()
            .map(Turn::to_chat_message)
            .collect()
    }

    /// Clear the transcript and rotate to a fresh session
    pub fn reset_session(&self) -> SessionId {
        let mut conversation = self.conversation();
        let previous = conversation.session_id.clone();

        conversation.short_term.clear();
        conversation.session_id = self
            .sessions
            .reset()
            .unwrap_or_else(|degraded| degraded.into_session_id());

        info!(previous = %previous, session_id = %conversation.session_id, "session reset");
        conversation.session_id.clone()
    }

    /// Stored metadata of the current session
    pub fn session_info(&self) -> Session {
        let session_id = self.current_session_id();
        self.sessions.get_metadata(&session_id)
    }

    pub fn stats(&self) -> MemoryStats {
        let (short_term_exchanges, token_usage) = {
            let conversation = self.conversation();
            (
                conversation.short_term.len(),
                conversation.short_term.token_usage(self.token_counter.as_ref()),
            )
        };

        let long_term = self.long_term.as_ref().and_then(|long_term| match long_term.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "long-term stats unavailable");
                None
            }
        });

        MemoryStats {
            session: self.session_info(),
            short_term_exchanges,
            token_usage,
            long_term,
        }
    }

    /// Chunk a document and store every chunk in long-term memory.
    ///
    /// A source that was ingested before is skipped. Index entries left by an
    /// ingestion that never committed are cleared before writing again.
    pub async fn ingest_document(&self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let path = path.as_ref();
        let long_term = self
            .long_term
            .as_ref()
            .ok_or_else(|| Error::persistence("long-term memory is unavailable"))?;

        let text = load_document(path).await?;
        let source = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();

        if long_term.has_source(&source)? {
            info!(source = %source, "document already in the knowledge base");
            return Ok(IngestReport {
                source,
                chunks: 0,
                skipped: true,
            });
        }
        if text.trim().is_empty() {
            return Err(Error::invalid_input(format!("{} contains no text", source)));
        }

        long_term.purge_uncommitted(&source).await?;

        let session_id = self.current_session_id();
        let items: Vec<(String, RecordMetadata)> = self
            .chunker
            .split(&text)
            .into_iter()
            .map(|chunk| {
                let metadata = RecordMetadata::document_chunk(&session_id, &source, chunk.index);
                (chunk.text, metadata)
            })
            .collect();

        let ids = long_term.remember_batch(items).await?;
        info!(source = %source, chunks = ids.len(), "document ingested");

        Ok(IngestReport {
            source,
            chunks: ids.len(),
            skipped: false,
        })
    }

    /// Document chunks most similar to `query`
    pub async fn search_documents(&self, query: &str, k: usize) -> Result<Vec<RecalledMemory>> {
        match &self.long_term {
            Some(long_term) => long_term.try_recall(query, k, Some(RecordKind::Document)).await,
            None => Ok(Vec::new()),
        }
    }
}
