//! Append-only JSONL vector index with brute-force search

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::memory::RecordKind;
use crate::storage::{cosine_similarity, IndexEntry, ScoredEntry, SimilarityIndex};

/// Flat similarity index: every entry lives in one JSONL file and in memory
pub struct FlatIndex {
    path: PathBuf,
    entries: Mutex<Vec<IndexEntry>>,
}

impl FlatIndex {
    /// Open the index file, creating it lazily on first insert.
    ///
    /// Unreadable lines (a torn tail from an interrupted append) are dropped
    /// and the file is rewritten without them, so later appends start on a
    /// clean line.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (entries, dropped) = Self::read_entries(&path)?;

        let index = Self {
            path,
            entries: Mutex::new(Vec::new()),
        };
        if dropped > 0 {
            index.rewrite(&entries)?;
            warn!(path = %index.path.display(), dropped, "repaired flat index");
        }
        info!(path = %index.path.display(), entries = entries.len(), "opened flat index");

        *index.lock() = entries;
        Ok(index)
    }

    /// Parsed entries plus the number of lines that could not be read
    fn read_entries(path: &Path) -> Result<(Vec<IndexEntry>, usize)> {
        if !path.exists() {
            return Ok((Vec::new(), 0));
        }

        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut dropped = 0;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IndexEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "skipping unreadable index line");
                    dropped += 1;
                }
            }
        }
        Ok((entries, dropped))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<IndexEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rewrite the whole file through a temp file
    fn rewrite(&self, entries: &[IndexEntry]) -> Result<()> {
        let temp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            for entry in entries {
                writeln!(file, "{}", serde_json::to_string(entry)?)?;
            }
            file.sync_all()?;
        }
        std::fs::rename(temp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl SimilarityIndex for FlatIndex {
    async fn insert(&self, entry: &IndexEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut entries = self.lock();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        file.sync_data()?;

        entries.push(entry.clone());
        debug!(id = %entry.id, kind = %entry.metadata.kind, "appended index entry");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        kind: Option<RecordKind>,
    ) -> Result<Vec<ScoredEntry>> {
        let entries = self.lock();
        let mut scored: Vec<ScoredEntry> = entries
            .iter()
            .filter(|entry| kind.map_or(true, |kind| entry.metadata.kind == kind))
            .map(|entry| ScoredEntry {
                id: entry.id,
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock().len())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() != before {
            self.rewrite(&entries)?;
        }
        Ok(())
    }

    async fn remove_source(&self, source: &str) -> Result<usize> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.metadata.source.as_deref() != Some(source));
        let removed = before - entries.len();
        if removed > 0 {
            self.rewrite(&entries)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordMetadata;

    fn entry(text: &str, vector: Vec<f32>, kind: RecordKind) -> IndexEntry {
        IndexEntry {
            id: Uuid::new_v4(),
            text: text.to_string(),
            vector,
            metadata: RecordMetadata::new("session_test", kind),
        }
    }

    #[tokio::test]
    async fn ranks_by_similarity_and_filters_kind() {
        let dir = tempfile::tempdir().unwrap();
        let index = FlatIndex::open(dir.path().join("index.jsonl")).unwrap();

        index
            .insert(&entry("north", vec![0.0, 1.0], RecordKind::Fact))
            .await
            .unwrap();
        index
            .insert(&entry("east", vec![1.0, 0.0], RecordKind::Fact))
            .await
            .unwrap();
        index
            .insert(&entry("doc east", vec![1.0, 0.1], RecordKind::Document))
            .await
            .unwrap();

        let facts = index.query(&[1.0, 0.0], 5, Some(RecordKind::Fact)).await.unwrap();
        let texts: Vec<_> = facts.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "north"]);
        assert!(facts[0].score > facts[1].score);

        let any = index.query(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(any[0].text, "east");
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let index = FlatIndex::open(dir.path().join("index.jsonl")).unwrap();
        for text in ["first", "second", "third"] {
            index
                .insert(&entry(text, vec![1.0, 1.0], RecordKind::Fact))
                .await
                .unwrap();
        }

        let hits = index.query(&[1.0, 1.0], 3, None).await.unwrap();
        let texts: Vec<_> = hits.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn survives_reopen_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let keep = entry("keep", vec![1.0, 0.0], RecordKind::Fact);
        let drop = entry("drop", vec![0.0, 1.0], RecordKind::Fact);
        {
            let index = FlatIndex::open(&path).unwrap();
            index.insert(&keep).await.unwrap();
            index.insert(&drop).await.unwrap();
            index.remove(drop.id).await.unwrap();
        }

        let reopened = FlatIndex::open(&path).unwrap();
        assert_eq!(reopened.len().await.unwrap(), 1);
        let hits = reopened.query(&[0.0, 1.0], 5, None).await.unwrap();
        assert_eq!(hits[0].id, keep.id);
    }

    #[tokio::test]
    async fn torn_tail_is_repaired_before_the_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let first = entry("first", vec![1.0, 0.0], RecordKind::Fact);
        let second = entry("second", vec![0.0, 1.0], RecordKind::Fact);

        FlatIndex::open(&path).unwrap().insert(&first).await.unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            write!(file, "{{\"id\":\"abc").unwrap();
        }

        let index = FlatIndex::open(&path).unwrap();
        assert_eq!(index.len().await.unwrap(), 1);
        index.insert(&second).await.unwrap();

        let reopened = FlatIndex::open(&path).unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        let hits = reopened.query(&[0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits[0].id, second.id);
    }

    #[tokio::test]
    async fn remove_source_drops_only_that_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        let mut chunk = entry("chunk", vec![1.0, 0.0], RecordKind::Document);
        chunk.metadata.source = Some("notes.txt".to_string());
        let fact = entry("fact", vec![1.0, 0.0], RecordKind::Fact);
        {
            let index = FlatIndex::open(&path).unwrap();
            index.insert(&chunk).await.unwrap();
            index.insert(&fact).await.unwrap();
            assert_eq!(index.remove_source("notes.txt").await.unwrap(), 1);
            assert_eq!(index.remove_source("notes.txt").await.unwrap(), 0);
        }

        let reopened = FlatIndex::open(&path).unwrap();
        let hits = reopened.query(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, fact.id);
    }

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let index = FlatIndex::open(dir.path().join("missing.jsonl")).unwrap();
        assert!(index.query(&[1.0], 3, None).await.unwrap().is_empty());
        assert_eq!(index.len().await.unwrap(), 0);
    }
}
