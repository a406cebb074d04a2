//! Storage backends for dieah-agents

mod jsonl;
mod sessions;
mod sqlite;
pub mod vector;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, IndexBackend};
use crate::error::Result;
use crate::memory::{RecordKind, RecordMetadata};

pub use jsonl::FlatIndex;
pub use sessions::{SessionEntry, SessionMap, SessionTable};
pub use sqlite::{CatalogEntry, RecordCatalog};
pub use vector::LanceIndex;

/// A record as handed to a similarity index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A record returned from a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub id: Uuid,
    pub text: String,
    pub metadata: RecordMetadata,
    /// Higher is more similar
    pub score: f32,
}

/// Nearest-neighbour index over embedded records.
///
/// `insert` must be durable when it returns `Ok`. `query` returns at most `k`
/// entries ordered by descending score; equal scores keep a stable order.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn insert(&self, entry: &IndexEntry) -> Result<()>;

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        kind: Option<RecordKind>,
    ) -> Result<Vec<ScoredEntry>>;

    /// Number of stored entries
    async fn len(&self) -> Result<usize>;

    /// Drop an entry; only used to undo a write whose catalog half failed
    async fn remove(&self, id: Uuid) -> Result<()>;

    /// Drop every entry chunked from `source`, returning how many went
    async fn remove_source(&self, source: &str) -> Result<usize>;
}

/// Open the index backend selected by the configuration
pub async fn open_index(config: &Config) -> Result<Arc<dyn SimilarityIndex>> {
    match config.index_backend {
        IndexBackend::Lance => Ok(Arc::new(LanceIndex::new(config).await?)),
        IndexBackend::Flat => Ok(Arc::new(FlatIndex::open(config.flat_index_path())?)),
    }
}

/// Cosine similarity; zero vectors are dissimilar to everything
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
