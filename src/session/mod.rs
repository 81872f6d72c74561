//! Session layer: durable, append-only conversation history.
//!
//! The [`SessionManager`] wraps a [`ConversationStore`] and supplies the
//! controller with a bounded window of recent turns. Append is the only
//! mutation; a turn is either fully persisted or not persisted at all.

pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;
use crate::retrieval::Citation;

pub use sqlite::SqliteConversationStore;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// A question from the user.
    User,
    /// An answer produced by the loop.
    Assistant,
}

impl TurnRole {
    /// Returns the string representation stored in the Conversation Store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parses a stored role string. `None` means the stored value is
    /// corrupt; the store surfaces that as a storage error rather than
    /// guessing a role.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A single conversation turn. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who produced the turn.
    pub role: TurnRole,
    /// Turn content: the question or the synthesized answer.
    pub content: String,
    /// Citations attached to an assistant turn (empty for user turns).
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// When the turn was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// Creates a user turn stamped with the current time.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            citations: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates an assistant turn with citations, stamped with the
    /// current time.
    #[must_use]
    pub fn assistant(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            citations,
            timestamp: Utc::now(),
        }
    }
}

/// Trait for the external Conversation Store.
///
/// Implementations must guarantee atomic append semantics: no partial
/// turns. Appends to the same session must be serialized; appends to
/// different sessions may proceed concurrently.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Loads up to `max_turns` most recent turns for a session, ordered
    /// most recent last.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Storage`] if the store is unavailable.
    async fn load_history(
        &self,
        session_id: &str,
        max_turns: usize,
    ) -> Result<Vec<ChatTurn>, AgentError>;

    /// Appends one turn to a session.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Storage`] if the turn could not be fully
    /// persisted. On error nothing is written.
    async fn append(&self, session_id: &str, turn: &ChatTurn) -> Result<(), AgentError>;
}

/// Loads and appends conversation turns on behalf of the controller.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn ConversationStore>,
    window: usize,
}

impl SessionManager {
    /// Creates a manager that supplies at most `window` recent turns as
    /// context.
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, window: usize) -> Self {
        Self { store, window }
    }

    /// Loads the bounded recent history for a session.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Storage`] if the store is unavailable.
    pub async fn load_recent(&self, session_id: &str) -> Result<Vec<ChatTurn>, AgentError> {
        let turns = self.store.load_history(session_id, self.window).await?;
        debug!(session_id, turns = turns.len(), "loaded session history");
        Ok(turns)
    }

    /// Persists one turn.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Storage`] if the append failed.
    pub async fn append(&self, session_id: &str, turn: &ChatTurn) -> Result<(), AgentError> {
        self.store.append(session_id, turn).await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
