//! SQLite catalog of long-term memory records

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::memory::{RecordKind, RecordMetadata};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    text        TEXT NOT NULL,
    source      TEXT,
    session_id  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    metadata    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
CREATE INDEX IF NOT EXISTS idx_records_source ON records(source);
"#;

/// A catalogued record, without its vector
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub text: String,
    pub metadata: RecordMetadata,
}

/// SQLite catalog backend
pub struct RecordCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl RecordCatalog {
    /// Open (or create) the catalog database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory catalog
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_row(conn: &Connection, entry: &CatalogEntry) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO records (id, kind, text, source, session_id, created_at, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                entry.id.to_string(),
                entry.metadata.kind.to_string(),
                entry.text,
                entry.metadata.source,
                entry.metadata.session_id,
                entry.metadata.timestamp.to_rfc3339(),
                serde_json::to_string(&entry.metadata)?,
            ],
        )?;
        Ok(())
    }

    /// Insert a record; records are immutable so a duplicate id is an error
    pub fn insert(&self, entry: &CatalogEntry) -> Result<()> {
        Self::insert_row(&self.conn(), entry)
    }

    /// Insert many records in one transaction: either all land or none do
    pub fn insert_all(&self, entries: &[CatalogEntry]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for entry in entries {
            Self::insert_row(&tx, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a record
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM records WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// Get a record by ID
    pub fn get(&self, id: Uuid) -> Result<Option<CatalogEntry>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, text, metadata FROM records WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(CatalogRow {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        metadata: row.get(2)?,
                    })
                },
            )
            .optional()?;

        row.map(CatalogRow::into_entry).transpose()
    }

    /// Count records of one kind (or all)
    pub fn count(&self, kind: Option<RecordKind>) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE ?1 IS NULL OR kind = ?1",
            params![kind.map(|k| k.to_string())],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Whether a record with this id is catalogued
    pub fn contains(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM records WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Whether any chunk of this document source is catalogued
    pub fn has_source(&self, source: &str) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM records WHERE source = ?1 LIMIT 1",
                params![source],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Distinct document sources, alphabetically
    pub fn sources(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT source FROM records WHERE source IS NOT NULL ORDER BY source",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }
}

/// Internal row representation
struct CatalogRow {
    id: String,
    text: String,
    metadata: String,
}

impl CatalogRow {
    fn into_entry(self) -> Result<CatalogEntry> {
        Ok(CatalogEntry {
            id: Uuid::parse_str(&self.id).map_err(|e| Error::persistence(e.to_string()))?,
            text: self.text,
            metadata: serde_json::from_str(&self.metadata)?,
        })
    }
}
