//! SQLite-backed Conversation Store.
//!
//! Each turn is one row inserted in a single statement, which gives the
//! atomic append the store contract requires. A mutex around the
//! connection serializes concurrent appends; SQLite itself orders rows
//! within a session by rowid.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::info;

use super::{ChatTurn, ConversationStore, TurnRole};
use crate::error::AgentError;
use crate::retrieval::Citation;

/// Conversation Store persisting turns to a SQLite database.
pub struct SqliteConversationStore {
    conn: Mutex<Connection>,
}

impl SqliteConversationStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Storage`] if the database cannot be opened
    /// or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let conn = Connection::open(path.as_ref()).map_err(storage_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!(path = %path.as_ref().display(), "opened conversation store");
        Ok(store)
    }

    /// Creates an in-memory store, used in tests.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Storage`] if the schema cannot be created.
    pub fn in_memory() -> Result<Self, AgentError> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), AgentError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chat_turns (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                citations  TEXT NOT NULL DEFAULT '[]',
                timestamp  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_turns_session
                ON chat_turns (session_id, id);",
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AgentError> {
        self.conn.lock().map_err(|_| AgentError::Storage {
            message: "conversation store lock poisoned".to_string(),
        })
    }
}

fn storage_err(e: rusqlite::Error) -> AgentError {
    AgentError::Storage {
        message: e.to_string(),
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn load_history(
        &self,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<ChatTurn>, AgentError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT role, content, citations, timestamp FROM chat_turns
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(storage_err)?;

        let rows = stmt
            .query_map(params![session_id, max_turns as i64], |row| {
                let role: String = row.get(0)?;
                let content: String = row.get(1)?;
                let citations_json: String = row.get(2)?;
                let timestamp: String = row.get(3)?;
                Ok((role, content, citations_json, timestamp))
            })
            .map_err(storage_err)?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, content, citations_json, timestamp) = row.map_err(storage_err)?;
            let citations: Vec<Citation> =
                serde_json::from_str(&citations_json).map_err(|e| AgentError::Storage {
                    message: format!("corrupt citations column: {e}"),
                })?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| AgentError::Storage {
                    message: format!("corrupt timestamp column: {e}"),
                })?
                .with_timezone(&Utc);
            let role = TurnRole::parse(&role).ok_or_else(|| AgentError::Storage {
                message: format!("corrupt role column: {role:?}"),
            })?;
            turns.push(ChatTurn {
                role,
                content,
                citations,
                timestamp,
            });
        }

        // Query ran newest-first; callers expect most recent last.
        turns.reverse();
        Ok(turns)
    }

    async fn append(&self, session_id: &str, turn: &ChatTurn) -> Result<(), AgentError> {
        let citations_json =
            serde_json::to_string(&turn.citations).map_err(|e| AgentError::Storage {
                message: format!("failed to serialize citations: {e}"),
            })?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chat_turns (session_id, role, content, citations, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                turn.role.as_str(),
                turn.content,
                citations_json,
                turn.timestamp.to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConversationStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteConversationStore {
        SqliteConversationStore::in_memory().unwrap_or_else(|e| unreachable!("in_memory: {e}"))
    }

    #[tokio::test]
    async fn test_append_and_load_ordering() {
        let store = store();
        store
            .append("s1", &ChatTurn::user("first"))
            .await
            .unwrap_or_else(|e| unreachable!("append: {e}"));
        store
            .append("s1", &ChatTurn::assistant("second", Vec::new()))
            .await
            .unwrap_or_else(|e| unreachable!("append: {e}"));

        let turns = store
            .load_history("s1", 10)
            .await
            .unwrap_or_else(|e| unreachable!("load: {e}"));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "first");
        assert_eq!(turns[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = store();
        store
            .append("a", &ChatTurn::user("for a"))
            .await
            .unwrap_or_else(|e| unreachable!("append: {e}"));
        store
            .append("b", &ChatTurn::user("for b"))
            .await
            .unwrap_or_else(|e| unreachable!("append: {e}"));

        let turns = store
            .load_history("a", 10)
            .await
            .unwrap_or_else(|e| unreachable!("load: {e}"));
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "for a");
    }

    #[tokio::test]
    async fn test_citations_round_trip() {
        let store = store();
        let citation = Citation {
            document_id: "D1".to_string(),
            location: "p.4".to_string(),
            excerpt: "$250,000".to_string(),
        };
        store
            .append("s1", &ChatTurn::assistant("answer", vec![citation.clone()]))
            .await
            .unwrap_or_else(|e| unreachable!("append: {e}"));

        let turns = store
            .load_history("s1", 1)
            .await
            .unwrap_or_else(|e| unreachable!("load: {e}"));
        assert_eq!(turns[0].citations, vec![citation]);
    }

    #[tokio::test]
    async fn test_corrupt_role_column_is_storage_error() {
        let store = store();
        {
            let conn = store.lock().unwrap_or_else(|e| unreachable!("lock: {e}"));
            conn.execute(
                "INSERT INTO chat_turns (session_id, role, content, citations, timestamp)
                 VALUES ('s1', 'system', 'oops', '[]', '2026-08-29T00:00:00+00:00')",
                [],
            )
            .unwrap_or_else(|e| unreachable!("insert: {e}"));
        }

        let result = store.load_history("s1", 10).await;
        match result {
            Err(AgentError::Storage { message }) => assert!(message.contains("role")),
            other => unreachable!("expected storage error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let path = dir.path().join("turns.db");
        {
            let store = SqliteConversationStore::open(&path)
                .unwrap_or_else(|e| unreachable!("open: {e}"));
            store
                .append("s1", &ChatTurn::user("persisted"))
                .await
                .unwrap_or_else(|e| unreachable!("append: {e}"));
        }
        let reopened =
            SqliteConversationStore::open(&path).unwrap_or_else(|e| unreachable!("open: {e}"));
        let turns = reopened
            .load_history("s1", 10)
            .await
            .unwrap_or_else(|e| unreachable!("load: {e}"));
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "persisted");
    }
}
