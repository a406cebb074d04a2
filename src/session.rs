//! Session lifecycle bookkeeping backed by the session table

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DegradedSession, Result};
use crate::storage::{SessionEntry, SessionMap, SessionTable};

/// Identifier of a conversation session, `session_<YYYYmmdd_HHMMSS>`
pub type SessionId = String;

/// Metadata of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    /// `None` when the session is unknown to the store
    pub created_at: Option<DateTime<Utc>>,
    pub message_count: u64,
}

impl Session {
    fn unknown(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            created_at: None,
            message_count: 0,
        }
    }

    fn from_entry(session_id: &str, entry: &SessionEntry) -> Self {
        Self {
            session_id: session_id.to_string(),
            created_at: Some(entry.created_at),
            message_count: entry.messages,
        }
    }
}

/// Single owner of the session table.
///
/// Every mutation goes through one lock: the table is re-read, merged into
/// the in-process cache, mutated and written back whole. When the file cannot
/// be read or written the cache keeps working and the caller gets an error
/// to log; the file is never overwritten with a table that failed to load.
pub struct SessionStore {
    table: SessionTable,
    cache: Mutex<SessionMap>,
}

impl SessionStore {
    /// Open the store; an unreadable table starts an empty in-memory cache
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let table = SessionTable::new(path);
        let cache = match table.read() {
            Ok(sessions) => {
                info!(path = %table.path().display(), sessions = sessions.len(), "loaded session table");
                sessions
            }
            Err(e) => {
                warn!(error = %e, "session table unavailable, tracking sessions in memory");
                SessionMap::new()
            }
        };

        Self {
            table,
            cache: Mutex::new(cache),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionMap> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pull the file into the cache. Counters only move forward, so a stale
    /// file never rolls back a count this process already holds.
    fn refresh(&self, cache: &mut SessionMap) -> Result<()> {
        let on_disk = self.table.read()?;
        for (id, entry) in on_disk {
            match cache.get_mut(&id) {
                Some(cached) if cached.messages >= entry.messages => {}
                Some(cached) => *cached = entry,
                None => {
                    cache.insert(id, entry);
                }
            }
        }
        Ok(())
    }

    fn mint_id(cache: &SessionMap, now: DateTime<Utc>) -> SessionId {
        let base = format!("session_{}", now.format("%Y%m%d_%H%M%S"));
        if !cache.contains_key(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !cache.contains_key(candidate))
            .unwrap_or(base)
    }

    /// Mint a new session with a zero message count.
    ///
    /// On a persistence failure the id is still returned inside the error.
    pub fn create_session(&self) -> std::result::Result<SessionId, DegradedSession> {
        let mut cache = self.lock();
        let readable = self.refresh(&mut cache);

        let now = Utc::now();
        let session_id = Self::mint_id(&cache, now);
        cache.insert(
            session_id.clone(),
            SessionEntry {
                created_at: now,
                messages: 0,
            },
        );

        let persisted = readable.and_then(|()| self.table.write(&cache));
        match persisted {
            Ok(()) => {
                info!(session_id = %session_id, "created session");
                Ok(session_id)
            }
            Err(source) => {
                warn!(session_id = %session_id, error = %source, "session created without persistence");
                Err(DegradedSession { session_id, source })
            }
        }
    }

    /// Stored metadata, or an empty record for an unknown id
    pub fn get_metadata(&self, session_id: &str) -> Session {
        let mut cache = self.lock();
        if let Err(e) = self.refresh(&mut cache) {
            debug!(error = %e, "serving session metadata from cache");
        }
        cache
            .get(session_id)
            .map(|entry| Session::from_entry(session_id, entry))
            .unwrap_or_else(|| Session::unknown(session_id))
    }

    /// Count one committed turn. Unknown ids are ignored.
    pub fn increment_message_count(&self, session_id: &str) -> Result<()> {
        let mut cache = self.lock();
        let readable = self.refresh(&mut cache);

        let Some(entry) = cache.get_mut(session_id) else {
            debug!(session_id, "increment for unknown session ignored");
            return Ok(());
        };
        entry.messages = entry.messages.saturating_add(1);

        readable?;
        self.table.write(&cache)
    }

    /// Start a fresh session; earlier sessions stay in the table
    pub fn reset(&self) -> std::result::Result<SessionId, DegradedSession> {
        self.create_session()
    }

    /// All known sessions, oldest id first
    pub fn sessions(&self) -> Vec<Session> {
        let mut cache = self.lock();
        if let Err(e) = self.refresh(&mut cache) {
            debug!(error = %e, "listing sessions from cache");
        }
        cache
            .iter()
            .map(|(id, entry)| Session::from_entry(id, entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("session_metadata.json"));
        (dir, store)
    }

    #[test]
    fn new_session_starts_at_zero() {
        let (_dir, store) = store();
        let id = store.create_session().unwrap();

        assert!(id.starts_with("session_"));
        let session = store.get_metadata(&id);
        assert_eq!(session.message_count, 0);
        assert!(session.created_at.is_some());
    }

    #[test]
    fn ids_are_unique_within_the_same_second() {
        let (_dir, store) = store();
        let ids: Vec<_> = (0..4).map(|_| store.create_session().unwrap()).collect();

        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn increments_only_the_named_session() {
        let (_dir, store) = store();
        let first = store.create_session().unwrap();
        let second = store.create_session().unwrap();

        store.increment_message_count(&second).unwrap();
        store.increment_message_count(&second).unwrap();

        assert_eq!(store.get_metadata(&first).message_count, 0);
        assert_eq!(store.get_metadata(&second).message_count, 2);
    }

    #[test]
    fn unknown_session_is_default_and_increment_is_noop() {
        let (_dir, store) = store();
        store.increment_message_count("session_missing").unwrap();

        let session = store.get_metadata("session_missing");
        assert_eq!(session.message_count, 0);
        assert_eq!(session.created_at, None);
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn counts_survive_reopen_and_reset_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_metadata.json");

        let first = {
            let store = SessionStore::open(&path);
            let id = store.create_session().unwrap();
            store.increment_message_count(&id).unwrap();
            id
        };

        let store = SessionStore::open(&path);
        assert_eq!(store.get_metadata(&first).message_count, 1);

        let fresh = store.reset().unwrap();
        assert_ne!(fresh, first);
        assert_eq!(store.get_metadata(&fresh).message_count, 0);
        assert_eq!(store.sessions().len(), 2);
    }

    #[test]
    fn unreadable_table_degrades_but_returns_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_metadata.json");
        std::fs::write(&path, "definitely not json").unwrap();

        let store = SessionStore::open(&path);
        let degraded = store.create_session().unwrap_err();
        assert!(matches!(degraded.source, Error::Persistence(_)));

        let id = degraded.into_session_id();
        assert!(store.increment_message_count(&id).is_err());
        assert_eq!(store.get_metadata(&id).message_count, 1);

        // the unreadable file is left alone
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "definitely not json");
    }
}
