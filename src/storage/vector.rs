//! Vector storage using LanceDB for semantic search

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::connect;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::memory::{RecordKind, RecordMetadata};
use crate::storage::{IndexEntry, ScoredEntry, SimilarityIndex};

const TABLE_NAME: &str = "memories";

/// Vector storage backend using LanceDB
pub struct LanceIndex {
    db: lancedb::Connection,
    dimensions: usize,
}

impl LanceIndex {
    /// Connect to the database and make sure the table exists
    pub async fn new(config: &Config) -> Result<Self> {
        let path = config.vector_db_path();
        let uri = path
            .to_str()
            .ok_or_else(|| Error::vector_db(format!("Non UTF-8 path: {}", path.display())))?;

        let db = connect(uri)
            .execute()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;

        let storage = Self {
            db,
            dimensions: config.embedding_dimensions,
        };
        storage.ensure_table().await?;
        info!(path = %path.display(), "opened lance index");

        Ok(storage)
    }

    /// Get the schema for the memories table
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("session_id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, true),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimensions as i32,
                ),
                false,
            ),
        ])
    }

    async fn ensure_table(&self) -> Result<()> {
        let tables = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;

        if !tables.contains(&TABLE_NAME.to_string()) {
            let schema = Arc::new(self.schema());
            let empty_batch = RecordBatch::new_empty(schema.clone());
            let reader = RecordBatchIterator::new(vec![empty_batch].into_iter().map(Ok), schema);

            self.db
                .create_table(TABLE_NAME, Box::new(reader))
                .execute()
                .await
                .map_err(|e| Error::vector_db(e.to_string()))?;
        }

        Ok(())
    }

    async fn table(&self) -> Result<lancedb::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| Error::vector_db(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| Error::vector_db(format!("{} column is not StringArray", name)))
    }
}

#[async_trait]
impl SimilarityIndex for LanceIndex {
    async fn insert(&self, entry: &IndexEntry) -> Result<()> {
        if entry.vector.len() != self.dimensions {
            return Err(Error::vector_db(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                entry.vector.len()
            )));
        }

        let id_array = StringArray::from(vec![entry.id.to_string()]);
        let text_array = StringArray::from(vec![entry.text.clone()]);
        let kind_array = StringArray::from(vec![entry.metadata.kind.to_string()]);
        let session_array = StringArray::from(vec![entry.metadata.session_id.clone()]);
        let source_array = StringArray::from(vec![entry.metadata.source.clone()]);
        let metadata_array = StringArray::from(vec![serde_json::to_string(&entry.metadata)?]);

        let values = Float32Array::from(entry.vector.clone());
        let vector_array = FixedSizeListArray::try_new_from_values(values, self.dimensions as i32)
            .map_err(|e: arrow_schema::ArrowError| Error::vector_db(e.to_string()))?;

        let schema = Arc::new(self.schema());
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(id_array) as Arc<dyn Array>,
                Arc::new(text_array),
                Arc::new(kind_array),
                Arc::new(session_array),
                Arc::new(source_array),
                Arc::new(metadata_array),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| Error::vector_db(e.to_string()))?;

        let reader = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);
        self.table()
            .await?
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;

        debug!(id = %entry.id, kind = %entry.metadata.kind, "added lance row");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        kind: Option<RecordKind>,
    ) -> Result<Vec<ScoredEntry>> {
        let table = self.table().await?;

        let mut query = table
            .vector_search(vector.to_vec())
            .map_err(|e: lancedb::Error| Error::retrieval(e.to_string()))?
            .limit(k);

        if let Some(kind) = kind {
            query = query.only_if(format!("kind = '{}'", kind));
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(|e: lancedb::Error| Error::retrieval(e.to_string()))?
            .try_collect::<Vec<RecordBatch>>()
            .await
            .map_err(|e: lancedb::Error| Error::retrieval(e.to_string()))?;

        let mut results = Vec::new();
        for batch in batches {
            let ids = Self::string_column(&batch, "id")?;
            let texts = Self::string_column(&batch, "text")?;
            let metadata = Self::string_column(&batch, "metadata")?;
            let distances = batch
                .column_by_name("_distance")
                .ok_or_else(|| Error::vector_db("Missing _distance column"))?
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| Error::vector_db("_distance column is not Float32Array"))?;

            for i in 0..batch.num_rows() {
                let metadata: RecordMetadata = serde_json::from_str(metadata.value(i))?;
                results.push(ScoredEntry {
                    id: Uuid::parse_str(ids.value(i))
                        .map_err(|e| Error::vector_db(e.to_string()))?,
                    text: texts.value(i).to_string(),
                    metadata,
                    // LanceDB returns L2 distance, convert to similarity score
                    score: 1.0 / (1.0 + distances.value(i)),
                });
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        Ok(results)
    }

    async fn len(&self) -> Result<usize> {
        self.table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| Error::vector_db(e.to_string()))
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.table()
            .await?
            .delete(&format!("id = '{}'", id))
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;
        Ok(())
    }

    async fn remove_source(&self, source: &str) -> Result<usize> {
        let table = self.table().await?;
        let filter = format!("source = '{}'", source.replace('\'', "''"));
        let matching = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| Error::vector_db(e.to_string()))?;
        if matching > 0 {
            table
                .delete(&filter)
                .await
                .map_err(|e| Error::vector_db(e.to_string()))?;
        }
        Ok(matching)
    }
}
