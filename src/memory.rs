//! Long-term memory: embedded, durable, semantically searchable records

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::retrieval::RecalledMemory;
use crate::storage::{CatalogEntry, IndexEntry, RecordCatalog, SimilarityIndex};

/// Identifier of a long-term record
pub type RecordId = Uuid;

/// What a record was created from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// An explicit "remember this" from the conversation
    Fact,
    /// A chunk of an ingested document
    Document,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Fact => write!(f, "fact"),
            RecordKind::Document => write!(f, "document"),
        }
    }
}

/// Metadata stored alongside every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub kind: RecordKind,

    /// Source file path for document chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Position of the chunk within its source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,

    /// Free-form caller metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl RecordMetadata {
    /// Default metadata: now, the given session
    pub fn new(session_id: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            kind,
            source: None,
            chunk_index: None,
            extra: BTreeMap::new(),
        }
    }

    /// Metadata for one chunk of a document
    pub fn document_chunk(
        session_id: impl Into<String>,
        source: impl Into<String>,
        chunk_index: usize,
    ) -> Self {
        Self {
            source: Some(source.into()),
            chunk_index: Some(chunk_index),
            ..Self::new(session_id, RecordKind::Document)
        }
    }

    /// Attach a free-form key/value pair
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A stored memory: text, its embedding and metadata. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl From<MemoryRecord> for IndexEntry {
    fn from(record: MemoryRecord) -> Self {
        Self {
            id: record.id,
            text: record.text,
            vector: record.embedding,
            metadata: record.metadata,
        }
    }
}

/// Record counts per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTermStats {
    pub facts: usize,
    pub document_chunks: usize,
    /// Documents in the knowledge base, alphabetically
    pub sources: Vec<String>,
}

/// The durable store: embedding service + similarity index + record catalog
pub struct LongTermMemory {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn SimilarityIndex>,
    catalog: RecordCatalog,
}

impl LongTermMemory {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn SimilarityIndex>,
        catalog: RecordCatalog,
    ) -> Self {
        Self {
            embedder,
            index,
            catalog,
        }
    }

    /// Get the record catalog
    pub fn catalog(&self) -> &RecordCatalog {
        &self.catalog
    }

    /// Embed and store a text. Nothing is written if the embedding fails.
    pub async fn remember(&self, text: &str, metadata: RecordMetadata) -> Result<RecordId> {
        let embedding = self.embedder.embed(text).await?;
        if embedding.len() != self.embedder.dimensions() {
            return Err(Error::embedding(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.embedder.dimensions(),
                embedding.len()
            )));
        }

        let record = MemoryRecord {
            id: Uuid::new_v4(),
            text: text.to_string(),
            embedding,
            metadata,
        };
        self.store(record).await
    }

    /// Embed and store many texts with one batch call.
    ///
    /// Every vector goes into the index first and the catalog rows follow in
    /// one transaction, so a batch is either catalogued whole or not at all.
    /// An embedding failure writes nothing and a failed write removes the
    /// index entries the batch already added.
    pub async fn remember_batch(
        &self,
        items: Vec<(String, RecordMetadata)>,
    ) -> Result<Vec<RecordId>> {
        let texts: Vec<String> = items.iter().map(|(text, _)| text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != items.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                items.len(),
                embeddings.len()
            )));
        }

        let mut ids = Vec::with_capacity(items.len());
        let mut rows = Vec::with_capacity(items.len());
        for ((text, metadata), embedding) in items.into_iter().zip(embeddings) {
            let entry = IndexEntry {
                id: Uuid::new_v4(),
                text,
                vector: embedding,
                metadata,
            };
            if let Err(e) = self.index.insert(&entry).await {
                self.unindex(&ids).await;
                return Err(e);
            }
            ids.push(entry.id);
            rows.push(CatalogEntry {
                id: entry.id,
                text: entry.text,
                metadata: entry.metadata,
            });
        }

        if let Err(e) = self.catalog.insert_all(&rows) {
            self.unindex(&ids).await;
            return Err(e);
        }
        debug!(records = ids.len(), "stored long-term batch");
        Ok(ids)
    }

    /// Undo index writes whose catalog half never landed
    async fn unindex(&self, ids: &[RecordId]) {
        for &id in ids {
            if let Err(e) = self.index.remove(id).await {
                warn!(id = %id, error = %e, "failed to remove index entry");
            }
        }
    }

    /// The catalog row is the commit marker: a record exists once it lands there
    async fn store(&self, record: MemoryRecord) -> Result<RecordId> {
        let id = record.id;
        let catalog_entry = CatalogEntry {
            id,
            text: record.text.clone(),
            metadata: record.metadata.clone(),
        };

        self.index.insert(&IndexEntry::from(record)).await?;
        if let Err(e) = self.catalog.insert(&catalog_entry) {
            self.unindex(&[id]).await;
            return Err(e);
        }

        debug!(id = %id, kind = %catalog_entry.metadata.kind, "stored long-term record");
        Ok(id)
    }

    /// Nearest records to `query`, most similar first. Errors propagate.
    pub async fn try_recall(
        &self,
        query: &str,
        k: usize,
        kind: Option<RecordKind>,
    ) -> Result<Vec<RecalledMemory>> {
        if k == 0 || self.index.len().await? == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| Error::retrieval(format!("could not embed query: {}", e)))?;
        let hits = self.index.query(&vector, k, kind).await?;

        // Index entries without a catalog row are leftovers of an interrupted write
        let mut recalled = Vec::with_capacity(hits.len());
        for hit in hits {
            if self.catalog.contains(hit.id)? {
                recalled.push(RecalledMemory::from(hit));
            } else {
                debug!(id = %hit.id, "skipping uncommitted index entry");
            }
        }
        Ok(recalled)
    }

    /// Nearest records to `query`; any failure reads as "nothing found"
    pub async fn recall(
        &self,
        query: &str,
        k: usize,
        kind: Option<RecordKind>,
    ) -> Vec<RecalledMemory> {
        match self.try_recall(query, k, kind).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "recall failed, treating as no relevant memory");
                Vec::new()
            }
        }
    }

    /// Whether a document source was already ingested
    pub fn has_source(&self, source: &str) -> Result<bool> {
        self.catalog.has_source(source)
    }

    /// Drop index entries of a source that never made it into the catalog
    pub async fn purge_uncommitted(&self, source: &str) -> Result<()> {
        if self.catalog.has_source(source)? {
            return Ok(());
        }
        let removed = self.index.remove_source(source).await?;
        if removed > 0 {
            warn!(source = %source, removed, "purged index entries of an interrupted ingestion");
        }
        Ok(())
    }

    /// Record counts per kind and the ingested sources
    pub fn stats(&self) -> Result<LongTermStats> {
        Ok(LongTermStats {
            facts: self.catalog.count(Some(RecordKind::Fact))?,
            document_chunks: self.catalog.count(Some(RecordKind::Document))?,
            sources: self.catalog.sources()?,
        })
    }

    /// Log the state of the store once it is wired up
    pub(crate) fn announce(&self) {
        match self.stats() {
            Ok(stats) => info!(
                facts = stats.facts,
                document_chunks = stats.document_chunks,
                "long-term memory ready"
            ),
            Err(e) => warn!(error = %e, "long-term memory ready, catalog unreadable"),
        }
    }
}
