//! Configuration for dieah-agents

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which embedding service backs long-term memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX model via fastembed
    FastEmbed,
    /// Ollama `/api/embeddings`
    Ollama,
}

/// Which similarity index stores long-term records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// LanceDB table under `vectors/`
    Lance,
    /// Append-only JSONL file with brute-force search
    Flat,
}

/// Configuration for the assistant core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for all storage
    pub data_dir: PathBuf,

    /// Embedding backend
    pub embedding_provider: EmbeddingProvider,

    /// Embedding model name (only used by the Ollama provider)
    pub embedding_model: String,

    /// Embedding dimensions (384 for all-MiniLM-L6-v2)
    pub embedding_dimensions: usize,

    /// Similarity index backend
    pub index_backend: IndexBackend,

    /// Number of facts returned by a memory recall
    pub recall_k: usize,

    /// Number of chunks returned by a document search
    pub document_results: usize,

    /// Document chunk size, in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks, in characters
    pub chunk_overlap: usize,

    /// Completion model served by Ollama
    pub completion_model: String,

    /// Ollama base URL
    pub ollama_url: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens generated per completion
    pub max_tokens: u32,

    /// Token budget for the chat history sent with each routing decision
    pub history_token_budget: u32,

    /// Maximum tool calls a sub-agent may make for one query
    pub max_tool_rounds: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dieah-agents");

        Self {
            data_dir,
            embedding_provider: EmbeddingProvider::FastEmbed,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimensions: 384, // MiniLM-L6-v2 outputs 384-dim vectors
            index_backend: IndexBackend::Lance,
            recall_k: 3,
            document_results: 3,
            chunk_size: 1000,
            chunk_overlap: 200,
            completion_model: "llama3.2:3b".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            history_token_budget: 4000,
            max_tool_rounds: 4,
        }
    }
}

impl Config {
    /// Create a new config with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Reject settings the memory layers cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.recall_k == 0 {
            return Err(Error::config("recall_k must be greater than zero"));
        }
        if self.embedding_dimensions == 0 {
            return Err(Error::config("embedding_dimensions must be greater than zero"));
        }
        Ok(())
    }

    /// Get the path to the session metadata table
    pub fn session_table_path(&self) -> PathBuf {
        self.data_dir.join("session_metadata.json")
    }

    /// Get the path to the record catalog
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("records.db")
    }

    /// Get the path to the vector database
    pub fn vector_db_path(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    /// Get the path to the flat index file
    pub fn flat_index_path(&self) -> PathBuf {
        self.data_dir.join("index.jsonl")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        if self.index_backend == IndexBackend::Lance {
            std::fs::create_dir_all(self.vector_db_path())?;
        }
        Ok(())
    }
}
