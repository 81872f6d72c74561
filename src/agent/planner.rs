//! Query planner.
//!
//! Decides what the loop does next: issue another search, answer with
//! the evidence gathered, or give up. Deterministic rules run before
//! the model so the loop-prevention and sufficiency shortcuts never
//! depend on model behavior:
//!
//! - last verdict `sufficient` → answer now;
//! - two consecutive fruitless attempts → give up;
//! - first query with no prior conversation → the raw question verbatim;
//! - a planned query repeating any prior query → give up.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::provider::LlmProvider;
use super::state::{SearchAttempt, Verdict};
use super::traits::{Agent, strip_code_fence};
use crate::error::AgentError;
use crate::session::ChatTurn;

/// Consecutive insufficient attempts with zero newly-relevant passages
/// before the planner stops reformulating.
const MAX_FRUITLESS_ATTEMPTS: usize = 2;

/// The planner's decision for the next loop transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Issue this search query.
    Search(String),
    /// Enough evidence has been gathered; synthesize the answer.
    Answer,
    /// Evidence is exhausted; answer from whatever exists (possibly
    /// the insufficient-information response).
    GiveUp,
}

/// Input to a planning decision.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    /// The original question, unchanged for the whole cycle.
    pub question: &'a str,
    /// Bounded recent conversation, most recent last.
    pub history: &'a [ChatTurn],
    /// Attempts completed so far this cycle.
    pub attempts: &'a [SearchAttempt],
}

/// Trait for the query planner.
///
/// Abstracted so the controller's state machine is testable with stub
/// planners.
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    /// Produces the next action for the cycle.
    ///
    /// Must never return a `Search` query byte-identical to one already
    /// present in `input.attempts`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Planning`] on model or parse failures; the
    /// controller treats this as a decision to give up.
    async fn plan(&self, input: PlanInput<'_>) -> Result<NextAction, AgentError>;
}

/// JSON schema of the planner model's response.
#[derive(Debug, Deserialize)]
struct PlannedQuery {
    search_query: String,
}

/// LLM-backed [`QueryPlanner`].
pub struct LlmPlanner {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl LlmPlanner {
    /// Creates a planner from configuration and its system prompt.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            provider,
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            system_prompt,
        }
    }

    /// Parses the model's JSON response into a search query.
    fn parse_query(content: &str) -> Result<String, AgentError> {
        let json_str = strip_code_fence(content);
        let parsed: PlannedQuery =
            serde_json::from_str(json_str).map_err(|e| AgentError::Planning {
                message: format!("failed to parse planned query: {e}"),
            })?;
        let query = parsed.search_query.trim().to_string();
        if query.is_empty() {
            return Err(AgentError::Planning {
                message: "planner returned an empty search query".to_string(),
            });
        }
        Ok(query)
    }

    /// True if the last `MAX_FRUITLESS_ATTEMPTS` attempts were all
    /// insufficient with zero newly-relevant passages.
    fn is_fruitless(attempts: &[SearchAttempt]) -> bool {
        attempts.len() >= MAX_FRUITLESS_ATTEMPTS
            && attempts
                .iter()
                .rev()
                .take(MAX_FRUITLESS_ATTEMPTS)
                .all(|a| a.verdict == Verdict::Insufficient && a.newly_relevant == 0)
    }
}

#[async_trait]
impl Agent for LlmPlanner {
    fn name(&self) -> &'static str {
        "planner"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[async_trait]
impl QueryPlanner for LlmPlanner {
    async fn plan(&self, input: PlanInput<'_>) -> Result<NextAction, AgentError> {
        // Sufficient evidence: answer without another model call.
        if input
            .attempts
            .last()
            .is_some_and(|a| a.verdict == Verdict::Sufficient)
        {
            debug!("last verdict sufficient, answering");
            return Ok(NextAction::Answer);
        }

        // Loop-prevention tie-break: consecutive fruitless attempts mean
        // reformulation is not finding anything new.
        if Self::is_fruitless(input.attempts) {
            debug!(
                attempts = input.attempts.len(),
                "consecutive fruitless attempts, giving up"
            );
            return Ok(NextAction::GiveUp);
        }

        // First query with no prior conversation: the raw question is
        // the query. Follow-ups go through the model to resolve
        // pronouns and ellipsis against history.
        if input.attempts.is_empty() && input.history.is_empty() {
            return Ok(NextAction::Search(input.question.to_string()));
        }

        let user_msg = super::prompt::build_planner_prompt(
            input.question,
            input.history,
            input.attempts,
        );
        let response = self
            .execute(self.provider.as_ref(), &user_msg)
            .await
            .map_err(|e| AgentError::Planning {
                message: e.to_string(),
            })?;
        let query = Self::parse_query(&response.content)?;

        // A repeated query would loop; give up instead of reissuing it.
        if input.attempts.iter().any(|a| a.query == query) {
            warn!(query, "planner repeated a prior query, giving up");
            return Ok(NextAction::GiveUp);
        }

        Ok(NextAction::Search(query))
    }
}

impl std::fmt::Debug for LlmPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmPlanner")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::retrieval::Passage;

    /// Mock provider returning a fixed planner response.
    struct FixedProvider {
        content: String,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            Ok(ChatResponse {
                content: self.content.clone(),
                usage: TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    fn planner(content: &str) -> LlmPlanner {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        LlmPlanner::new(
            Arc::new(FixedProvider {
                content: content.to_string(),
            }),
            &config,
            super::super::prompt::PLANNER_SYSTEM_PROMPT.to_string(),
        )
    }

    fn attempt(index: usize, query: &str, verdict: Verdict, newly_relevant: usize) -> SearchAttempt {
        SearchAttempt {
            attempt_index: index,
            query: query.to_string(),
            results: Vec::<Passage>::new(),
            verdict,
            newly_relevant,
            rationale: "review".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_query_is_raw_question() {
        let p = planner(r#"{"search_query": "should not be used"}"#);
        let action = p
            .plan(PlanInput {
                question: "What is the total price?",
                history: &[],
                attempts: &[],
            })
            .await
            .unwrap_or_else(|e| unreachable!("plan failed: {e}"));
        assert_eq!(
            action,
            NextAction::Search("What is the total price?".to_string())
        );
    }

    #[tokio::test]
    async fn test_sufficient_verdict_answers() {
        let p = planner(r#"{"search_query": "should not be used"}"#);
        let attempts = vec![attempt(0, "price", Verdict::Sufficient, 2)];
        let action = p
            .plan(PlanInput {
                question: "What is the total price?",
                history: &[],
                attempts: &attempts,
            })
            .await
            .unwrap_or_else(|e| unreachable!("plan failed: {e}"));
        assert_eq!(action, NextAction::Answer);
    }

    #[tokio::test]
    async fn test_fruitless_attempts_give_up() {
        let p = planner(r#"{"search_query": "yet another reformulation"}"#);
        let attempts = vec![
            attempt(0, "price", Verdict::Insufficient, 0),
            attempt(1, "total contract value", Verdict::Insufficient, 0),
        ];
        let action = p
            .plan(PlanInput {
                question: "What is the total price?",
                history: &[],
                attempts: &attempts,
            })
            .await
            .unwrap_or_else(|e| unreachable!("plan failed: {e}"));
        assert_eq!(action, NextAction::GiveUp);
    }

    #[tokio::test]
    async fn test_progress_resets_fruitless_rule() {
        // Second attempt found evidence, so the model is consulted.
        let p = planner(r#"{"search_query": "payment schedule milestones"}"#);
        let attempts = vec![
            attempt(0, "price", Verdict::Insufficient, 0),
            attempt(1, "total contract value", Verdict::Insufficient, 3),
        ];
        let action = p
            .plan(PlanInput {
                question: "What is the total price?",
                history: &[],
                attempts: &attempts,
            })
            .await
            .unwrap_or_else(|e| unreachable!("plan failed: {e}"));
        assert_eq!(
            action,
            NextAction::Search("payment schedule milestones".to_string())
        );
    }

    #[tokio::test]
    async fn test_repeated_query_gives_up() {
        let p = planner(r#"{"search_query": "price"}"#);
        let attempts = vec![attempt(0, "price", Verdict::Insufficient, 1)];
        let action = p
            .plan(PlanInput {
                question: "What is the total price?",
                history: &[],
                attempts: &attempts,
            })
            .await
            .unwrap_or_else(|e| unreachable!("plan failed: {e}"));
        assert_eq!(action, NextAction::GiveUp);
    }

    #[tokio::test]
    async fn test_follow_up_uses_model_with_history() {
        let p = planner(r#"{"search_query": "delivery date schedule timeline"}"#);
        let history = vec![
            ChatTurn::user("What is the total price in document D1?"),
            ChatTurn::assistant("The total price is $250,000.", Vec::new()),
        ];
        let action = p
            .plan(PlanInput {
                question: "and what about the delivery date?",
                history: &history,
                attempts: &[],
            })
            .await
            .unwrap_or_else(|e| unreachable!("plan failed: {e}"));
        assert_eq!(
            action,
            NextAction::Search("delivery date schedule timeline".to_string())
        );
    }

    #[test]
    fn test_parse_query_code_block() {
        let query = LlmPlanner::parse_query("```json\n{\"search_query\": \"deadline\"}\n```");
        assert_eq!(query.unwrap_or_default(), "deadline");
    }

    #[test]
    fn test_parse_query_invalid() {
        assert!(LlmPlanner::parse_query("not json").is_err());
    }

    #[test]
    fn test_parse_query_empty_rejected() {
        assert!(LlmPlanner::parse_query(r#"{"search_query": "   "}"#).is_err());
    }
}
