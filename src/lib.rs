//! # Dieah Agents
//!
//! Core of a local multi-agent assistant: a supervisor that routes each
//! utterance to a direct answer or to one specialised sub-agent, backed by
//! session-scoped conversational memory and a durable semantic memory.
//!
//! ## Architecture
//!
//! - **Session store** - durable session ids and per-session message counts
//! - **Short-term memory** - the in-process transcript of the current session
//! - **Long-term memory** - embedded records in a similarity index, with a
//!   SQLite catalog alongside
//! - **Memory manager** - one facade over the three, used by every agent
//! - **Supervisor** - the router, delegating to the calculator and
//!   document-QA agents or to the memory tools
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dieah_agents::{Config, MemoryManager, OllamaClient, Supervisor};
//!
//! let config = Config::default();
//! let completion = Arc::new(OllamaClient::new(&config));
//! let manager = Arc::new(MemoryManager::open(config).await?);
//! let supervisor = Supervisor::with_default_agents(completion, manager);
//!
//! let reply = supervisor.handle("What is 12*7+3?").await;
//! ```

pub mod agents;
pub mod calculator;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod manager;
pub mod memory;
pub mod message;
pub mod retrieval;
pub mod session;
pub mod short_term;
pub mod storage;
pub mod telemetry;

pub use agents::{CalculatorAgent, Delegate, DocumentQaAgent, RouterState, Supervisor};
pub use config::Config;
pub use error::{DegradedSession, Error, Result};
pub use llm::{Completion, CompletionRequest, CompletionService, OllamaClient, ToolCall, ToolSpec};
pub use manager::{IngestReport, MemoryManager, MemoryStats};
pub use memory::{LongTermMemory, MemoryRecord, RecordId, RecordKind, RecordMetadata};
pub use message::{Role, Speaker, Turn};
pub use retrieval::{FactRecall, RecalledMemory, NO_RELEVANT_MEMORY};
pub use session::{Session, SessionId, SessionStore};
pub use short_term::ShortTermMemory;
