//! Chat service.
//!
//! The crate's top-level entry point for answering a question: loads
//! the session's bounded history, runs one answering cycle, and
//! persists the user and assistant turns. Persistence happens only
//! after a cycle completes, so a cancelled request leaves the
//! conversation untouched.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::controller::LoopController;
use crate::agent::state::Question;
use crate::error::AgentError;
use crate::retrieval::Citation;
use crate::session::{ChatTurn, SessionManager};

/// A completed answer for one question.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The session the question belongs to.
    pub session_id: String,
    /// The synthesized answer text.
    pub answer: String,
    /// Citations backing the answer, in order of first appearance.
    pub citations: Vec<Citation>,
    /// Whether the cycle gave up before deciding it had sufficient
    /// evidence.
    pub gave_up: bool,
}

/// Errors from the chat service.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The answer was computed but could not be saved. The response is
    /// carried so the caller can retry persistence without recomputing
    /// the cycle.
    #[error("answer computed but saving the conversation failed: {source}")]
    Save {
        /// The computed response.
        response: Box<ChatResponse>,
        /// The underlying storage failure.
        #[source]
        source: AgentError,
    },
    /// The cycle itself failed (cancellation, synthesis, or history
    /// load).
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Answers questions and maintains conversation history.
#[derive(Debug)]
pub struct ChatService {
    session: SessionManager,
    controller: LoopController,
}

impl ChatService {
    /// Creates a service over a session manager and a loop controller.
    #[must_use]
    pub const fn new(session: SessionManager, controller: LoopController) -> Self {
        Self {
            session,
            controller,
        }
    }

    /// Answers one question within its session.
    ///
    /// Runs a full answering cycle against the question's session
    /// history, then appends the user turn and the assistant turn to
    /// the Conversation Store. Cancellation at any point before
    /// persistence writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Agent`] if the cycle fails (including
    /// [`AgentError::Cancelled`]), or [`ChatError::Save`] carrying the
    /// computed response if only persistence failed.
    pub async fn answer(
        &self,
        question: Question,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, ChatError> {
        let session_id = question.session_id.clone();
        let question_text = question.text.clone();
        info!(session_id, "answering question");

        let history = self.session.load_recent(&session_id).await?;
        let outcome = self.controller.run(question, history, cancel).await?;

        let response = ChatResponse {
            session_id: session_id.clone(),
            answer: outcome.answer.text,
            citations: outcome.answer.citations,
            gave_up: outcome.gave_up,
        };

        let user_turn = ChatTurn::user(question_text);
        let assistant_turn = ChatTurn::assistant(response.answer.clone(), response.citations.clone());
        match self.persist(&session_id, &user_turn, &assistant_turn).await {
            Ok(()) => Ok(response),
            Err(source) => {
                warn!(session_id, error = %source, "failed to persist conversation turns");
                Err(ChatError::Save {
                    response: Box::new(response),
                    source,
                })
            }
        }
    }

    async fn persist(
        &self,
        session_id: &str,
        user_turn: &ChatTurn,
        assistant_turn: &ChatTurn,
    ) -> Result<(), AgentError> {
        self.session.append(session_id, user_turn).await?;
        self.session.append(session_id, assistant_turn).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::agent::config::AgentConfig;
    use crate::agent::grader::{GradeDecision, RelevanceGrader};
    use crate::agent::planner::{NextAction, PlanInput, QueryPlanner};
    use crate::agent::state::{SearchAttempt, Verdict};
    use crate::agent::synthesizer::{AnswerSynthesizer, SynthesizedAnswer};
    use crate::retrieval::{Passage, RetrieverGateway, SearchScope};
    use crate::session::sqlite::SqliteConversationStore;
    use crate::session::{ConversationStore, TurnRole};

    struct AnswerPlanner;

    #[async_trait]
    impl QueryPlanner for AnswerPlanner {
        async fn plan(&self, _input: PlanInput<'_>) -> Result<NextAction, AgentError> {
            Ok(NextAction::Search("deadline".to_string()))
        }
    }

    struct OneShotRetriever;

    #[async_trait]
    impl RetrieverGateway for OneShotRetriever {
        async fn search(
            &self,
            _query: &str,
            _scope: &SearchScope,
            _top_k: usize,
        ) -> Result<Vec<Passage>, AgentError> {
            Ok(vec![Passage {
                document_id: "rfp.pdf".to_string(),
                location: "p.3".to_string(),
                text: "Proposals are due June 1.".to_string(),
                score: 0.9,
                graded_relevant: None,
            }])
        }
    }

    struct SufficientGrader;

    #[async_trait]
    impl RelevanceGrader for SufficientGrader {
        async fn grade(
            &self,
            _question: &str,
            batch: &[Passage],
            _vetted: &[Passage],
            _attempts: &[SearchAttempt],
        ) -> Result<GradeDecision, AgentError> {
            Ok(GradeDecision {
                rationale: "covers the question".to_string(),
                relevant: (0..batch.len()).collect(),
                irrelevant: Vec::new(),
                verdict: Verdict::Sufficient,
            })
        }
    }

    struct FixedSynthesizer;

    #[async_trait]
    impl AnswerSynthesizer for FixedSynthesizer {
        async fn synthesize(
            &self,
            _question: &str,
            relevant: &[Passage],
            _history: &[ChatTurn],
        ) -> Result<SynthesizedAnswer, AgentError> {
            Ok(SynthesizedAnswer {
                text: "Proposals are due June 1 [S1].".to_string(),
                citations: relevant.iter().map(crate::retrieval::Citation::from_passage).collect(),
            })
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ConversationStore for FailingStore {
        async fn load_history(
            &self,
            _session_id: &str,
            _max_turns: usize,
        ) -> Result<Vec<ChatTurn>, AgentError> {
            Ok(Vec::new())
        }

        async fn append(&self, _session_id: &str, _turn: &ChatTurn) -> Result<(), AgentError> {
            Err(AgentError::Storage {
                message: "disk full".to_string(),
            })
        }
    }

    struct AnswerOnly;

    #[async_trait]
    impl QueryPlanner for AnswerOnly {
        async fn plan(&self, _input: PlanInput<'_>) -> Result<NextAction, AgentError> {
            Ok(NextAction::Answer)
        }
    }

    fn controller_with_planner(planner: Arc<dyn QueryPlanner>) -> LoopController {
        let config = AgentConfig::builder()
            .api_key("test")
            .retry_backoff(Duration::from_millis(1))
            .build()
            .unwrap_or_else(|_| unreachable!());
        LoopController::new(
            planner,
            Arc::new(SufficientGrader),
            Arc::new(FixedSynthesizer),
            Arc::new(OneShotRetriever),
            config,
        )
    }

    fn service_with_store(store: Arc<dyn ConversationStore>) -> ChatService {
        ChatService::new(
            SessionManager::new(store, 10),
            controller_with_planner(Arc::new(AnswerPlanner)),
        )
    }

    #[tokio::test]
    async fn test_answer_persists_both_turns() {
        let store = Arc::new(SqliteConversationStore::in_memory().unwrap_or_else(|e| {
            unreachable!("in-memory store: {e}")
        }));
        let service = service_with_store(Arc::clone(&store) as _);

        let response = service
            .answer(
                Question::new("s1", "When are proposals due?"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_or_else(|e| unreachable!("answer failed: {e}"));
        assert_eq!(response.session_id, "s1");
        assert!(response.answer.contains("June 1"));
        assert_eq!(response.citations.len(), 1);
        assert!(!response.gave_up);

        let turns = store
            .load_history("s1", 10)
            .await
            .unwrap_or_else(|e| unreachable!("load failed: {e}"));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[0].content, "When are proposals due?");
        assert_eq!(turns[1].role, TurnRole::Assistant);
        assert_eq!(turns[1].citations.len(), 1);
    }

    #[tokio::test]
    async fn test_save_failure_carries_computed_response() {
        let service = service_with_store(Arc::new(FailingStore));

        let result = service
            .answer(
                Question::new("s1", "When are proposals due?"),
                &CancellationToken::new(),
            )
            .await;
        match result {
            Err(ChatError::Save { response, source }) => {
                assert!(response.answer.contains("June 1"));
                assert!(matches!(source, AgentError::Storage { .. }));
            }
            other => unreachable!("expected Save error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_writes_no_turns() {
        let store = Arc::new(SqliteConversationStore::in_memory().unwrap_or_else(|e| {
            unreachable!("in-memory store: {e}")
        }));
        let service = service_with_store(Arc::clone(&store) as _);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = service
            .answer(Question::new("s1", "When are proposals due?"), &cancel)
            .await;
        assert!(matches!(result, Err(ChatError::Agent(AgentError::Cancelled))));

        let turns = store
            .load_history("s1", 10)
            .await
            .unwrap_or_else(|e| unreachable!("load failed: {e}"));
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn test_answer_only_cycle_uses_fallback() {
        let service = ChatService::new(
            SessionManager::new(
                Arc::new(SqliteConversationStore::in_memory().unwrap_or_else(|e| {
                    unreachable!("in-memory store: {e}")
                })) as _,
                10,
            ),
            controller_with_planner(Arc::new(AnswerOnly)),
        );

        let response = service
            .answer(Question::new("s1", "q"), &CancellationToken::new())
            .await
            .unwrap_or_else(|e| unreachable!("answer failed: {e}"));
        // No searches ran, so no citations.
        assert!(response.citations.is_empty());
    }
}
