//! Error types for dieah-agents

use thiserror::Error;

use crate::session::SessionId;

/// Result type alias for dieah-agents operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dieah-agents
#[derive(Error, Debug)]
pub enum Error {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Delegate failure: {0}")]
    Delegate(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vector database error: {0}")]
    VectorDb(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid expression: {0}")]
    Expression(String),
}

impl Error {
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingService(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn delegate(msg: impl Into<String>) -> Self {
        Self::Delegate(msg.into())
    }

    pub fn completion(msg: impl Into<String>) -> Self {
        Self::Completion(msg.into())
    }

    pub fn vector_db(msg: impl Into<String>) -> Self {
        Self::VectorDb(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn expression(msg: impl Into<String>) -> Self {
        Self::Expression(msg.into())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// A session was minted but could not be recorded in the session table.
///
/// The id is still usable; the process simply runs without durable session
/// tracking until the table becomes writable again.
#[derive(Error, Debug)]
#[error("session {session_id} is not persisted: {source}")]
pub struct DegradedSession {
    pub session_id: SessionId,
    #[source]
    pub source: Error,
}

impl DegradedSession {
    /// Keep the in-memory session id and drop the persistence failure
    pub fn into_session_id(self) -> SessionId {
        self.session_id
    }
}
