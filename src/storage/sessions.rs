//! JSON table file holding per-session metadata

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One row of the session table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub created_at: DateTime<Utc>,
    pub messages: u64,
}

/// session_id → entry, ordered so the file diffs cleanly
pub type SessionMap = BTreeMap<String, SessionEntry>;

/// The durable table: read whole, written whole
#[derive(Debug, Clone)]
pub struct SessionTable {
    path: PathBuf,
}

impl SessionTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table; a missing file is an empty table
    pub fn read(&self) -> Result<SessionMap> {
        if !self.path.exists() {
            return Ok(SessionMap::new());
        }

        let file = File::open(&self.path).map_err(|e| self.error("read", e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| self.error("parse", e))
    }

    /// Replace the table on disk through a temp file and rename
    pub fn write(&self, sessions: &SessionMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.error("create directory for", e))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        {
            let file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)
                .map_err(|e| self.error("write", e))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, sessions)
                .map_err(|e| self.error("serialize", e))?;
            writer.flush().map_err(|e| self.error("flush", e))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| self.error("sync", e))?;
        }
        std::fs::rename(&temp_path, &self.path).map_err(|e| self.error("replace", e))?;
        Ok(())
    }

    fn error(&self, action: &str, err: impl std::fmt::Display) -> Error {
        Error::persistence(format!(
            "failed to {} session table {}: {}",
            action,
            self.path.display(),
            err
        ))
    }
}
