//! SQLite-backed session persistence.
//!
//! `put` only stages the serialized session in memory; `sync` writes every
//! staged session in one transaction. The registry calls `sync` right after a
//! login and from the periodic flush task.

use async_trait::async_trait;
use barqing_core::error::{BarqingError, Result};
use barqing_core::traits::SessionStore;
use barqing_core::types::UserSession;
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

fn store_err(e: impl std::fmt::Display) -> BarqingError {
    BarqingError::Store(e.to_string())
}

/// Session store on a single SQLite file.
pub struct SessionDb {
    conn: Mutex<Connection>,
    staged: Mutex<HashMap<String, String>>,
}

impl SessionDb {
    /// Open or create the session database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        let conn = Connection::open(path).map_err(|e| store_err(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    /// In-memory database, nothing survives the process.
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,          -- JSON-encoded UserSession
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(|e| store_err(format!("Migration: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            staged: Mutex::new(HashMap::new()),
        })
    }

    /// Number of staged, not yet synced sessions.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.staged.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for SessionDb {
    async fn load_all(&self) -> Result<Vec<(String, UserSession)>> {
        let conn = self.conn.lock().map_err(store_err)?;
        let mut stmt = conn
            .prepare("SELECT key, data FROM sessions ORDER BY key")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(store_err)?;

        let mut sessions = Vec::new();
        for row in rows {
            let (key, data) = row.map_err(store_err)?;
            match serde_json::from_str::<UserSession>(&data) {
                Ok(session) => sessions.push((key, session)),
                Err(e) => tracing::warn!("⚠️ Skipping unreadable session '{key}': {e}"),
            }
        }
        Ok(sessions)
    }

    async fn put(&self, key: &str, session: &UserSession) -> Result<()> {
        let data = serde_json::to_string(session)?;
        self.staged
            .lock()
            .map_err(store_err)?
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        // staged rows stay staged until the commit succeeds
        let staged: Vec<(String, String)> = self
            .staged
            .lock()
            .map_err(store_err)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if staged.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().map_err(store_err)?;
        let tx = conn.transaction().map_err(store_err)?;
        let now = Utc::now().to_rfc3339();
        for (key, data) in &staged {
            tx.execute(
                "INSERT OR REPLACE INTO sessions (key, data, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, data, now],
            )
            .map_err(|e| store_err(format!("Save session: {e}")))?;
        }
        tx.commit().map_err(store_err)?;
        drop(conn);

        let mut pending = self.staged.lock().map_err(store_err)?;
        for (key, data) in &staged {
            // a newer put for the same key waits for the next sync
            if pending.get(key) == Some(data) {
                pending.remove(key);
            }
        }
        drop(pending);
        tracing::debug!("💾 Synced {} sessions", staged.len());
        Ok(())
    }
}
