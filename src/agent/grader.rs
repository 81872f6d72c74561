//! Relevance grader.
//!
//! Reviews a batch of retrieved passages against the question and
//! produces two things: a relevant/irrelevant split of the batch, and a
//! sufficiency verdict over the whole cycle's evidence so far. One
//! JSON-mode model call grades the entire batch, so all passage
//! judgments complete before the verdict is computed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::provider::LlmProvider;
use super::state::{SearchAttempt, Verdict};
use super::traits::{Agent, strip_code_fence};
use crate::error::AgentError;
use crate::retrieval::Passage;

/// The grader's decision over one passage batch.
#[derive(Debug, Clone)]
pub struct GradeDecision {
    /// The grader's written analysis, fed back to the planner.
    pub rationale: String,
    /// Batch indices judged relevant. Always within bounds.
    pub relevant: Vec<usize>,
    /// Batch indices judged irrelevant. Always within bounds.
    pub irrelevant: Vec<usize>,
    /// Sufficiency of the cycle's whole evidence set.
    pub verdict: Verdict,
}

/// Trait for the relevance grader.
///
/// Abstracted so the controller's state machine is testable with stub
/// graders.
#[async_trait]
pub trait RelevanceGrader: Send + Sync {
    /// Grades a batch of passages against the question.
    ///
    /// `vetted` is the cycle's accumulated relevant set and `attempts`
    /// the prior search history: the verdict must judge the whole
    /// cycle's evidence, not just this batch. An empty batch always
    /// yields an insufficient verdict.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Grading`] on model or parse failures; the
    /// controller treats the batch as irrelevant and continues.
    async fn grade(
        &self,
        question: &str,
        batch: &[Passage],
        vetted: &[Passage],
        attempts: &[SearchAttempt],
    ) -> Result<GradeDecision, AgentError>;
}

/// JSON schema of the grader model's response.
#[derive(Debug, Deserialize)]
struct ReviewResponse {
    thought_process: String,
    #[serde(default)]
    relevant: Vec<usize>,
    #[serde(default)]
    irrelevant: Vec<usize>,
    verdict: Verdict,
}

/// LLM-backed [`RelevanceGrader`].
pub struct LlmGrader {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl LlmGrader {
    /// Creates a grader from configuration and its system prompt.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            provider,
            model: config.grader_model.clone(),
            max_tokens: config.grader_max_tokens,
            system_prompt,
        }
    }

    /// Parses and validates the model's review response.
    ///
    /// Models occasionally return indices beyond the batch (e.g.
    /// `[0,1,2,3,4]` for a two-passage batch); out-of-range indices are
    /// dropped with a warning rather than failing the cycle.
    fn parse_decision(content: &str, batch_len: usize) -> Result<GradeDecision, AgentError> {
        let json_str = strip_code_fence(content);
        let parsed: ReviewResponse =
            serde_json::from_str(json_str).map_err(|e| AgentError::Grading {
                message: format!("failed to parse review response: {e}"),
            })?;

        let (relevant, dropped_relevant): (Vec<usize>, Vec<usize>) =
            parsed.relevant.into_iter().partition(|&i| i < batch_len);
        let (irrelevant, dropped_irrelevant): (Vec<usize>, Vec<usize>) =
            parsed.irrelevant.into_iter().partition(|&i| i < batch_len);

        if !dropped_relevant.is_empty() || !dropped_irrelevant.is_empty() {
            warn!(
                ?dropped_relevant,
                ?dropped_irrelevant,
                batch_len,
                "grader returned out-of-range indices"
            );
        }

        Ok(GradeDecision {
            rationale: parsed.thought_process,
            relevant,
            irrelevant,
            verdict: parsed.verdict,
        })
    }
}

#[async_trait]
impl Agent for LlmGrader {
    fn name(&self) -> &'static str {
        "grader"
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
impl RelevanceGrader for LlmGrader {
    async fn grade(
        &self,
        question: &str,
        batch: &[Passage],
        vetted: &[Passage],
        attempts: &[SearchAttempt],
    ) -> Result<GradeDecision, AgentError> {
        // Nothing to review: insufficient by definition, no model call.
        if batch.is_empty() {
            return Ok(GradeDecision {
                rationale: "No search results to review.".to_string(),
                relevant: Vec::new(),
                irrelevant: Vec::new(),
                verdict: Verdict::Insufficient,
            });
        }

        let user_msg = super::prompt::build_grader_prompt(question, batch, vetted, attempts);
        let response = self
            .execute(self.provider.as_ref(), &user_msg)
            .await
            .map_err(|e| AgentError::Grading {
                message: e.to_string(),
            })?;

        let decision = Self::parse_decision(&response.content, batch.len())?;
        debug!(
            relevant = decision.relevant.len(),
            irrelevant = decision.irrelevant.len(),
            verdict = ?decision.verdict,
            "graded passage batch"
        );
        Ok(decision)
    }
}

impl std::fmt::Debug for LlmGrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGrader")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};

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

    fn grader(content: &str) -> LlmGrader {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        LlmGrader::new(
            Arc::new(FixedProvider {
                content: content.to_string(),
            }),
            &config,
            super::super::prompt::GRADER_SYSTEM_PROMPT.to_string(),
        )
    }

    fn passage(doc: &str) -> Passage {
        Passage {
            document_id: doc.to_string(),
            location: "p.1".to_string(),
            text: "text".to_string(),
            score: 0.5,
            graded_relevant: None,
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_insufficient_without_model_call() {
        let g = grader("this provider response would fail to parse");
        let decision = g
            .grade("q", &[], &[], &[])
            .await
            .unwrap_or_else(|e| unreachable!("grade failed: {e}"));
        assert_eq!(decision.verdict, Verdict::Insufficient);
        assert!(decision.relevant.is_empty());
    }

    #[tokio::test]
    async fn test_grade_parses_review() {
        let g = grader(
            r#"{"thought_process": "result 0 answers the question",
                "relevant": [0], "irrelevant": [1], "verdict": "sufficient"}"#,
        );
        let batch = vec![passage("D1"), passage("D2")];
        let decision = g
            .grade("q", &batch, &[], &[])
            .await
            .unwrap_or_else(|e| unreachable!("grade failed: {e}"));
        assert_eq!(decision.relevant, vec![0]);
        assert_eq!(decision.irrelevant, vec![1]);
        assert_eq!(decision.verdict, Verdict::Sufficient);
    }

    #[test_case(r#"[0, 1, 2, 3, 4]"#, "[7]", vec![0, 1], vec![] ; "both lists overflow")]
    #[test_case("[0]", "[1]", vec![0], vec![1] ; "all in range")]
    #[test_case("[2]", "[]", vec![], vec![] ; "only overflow")]
    fn test_parse_decision_bounds(
        relevant: &str,
        irrelevant: &str,
        expect_relevant: Vec<usize>,
        expect_irrelevant: Vec<usize>,
    ) {
        let content = format!(
            r#"{{"thought_process": "x", "relevant": {relevant}, "irrelevant": {irrelevant}, "verdict": "insufficient"}}"#
        );
        let decision = LlmGrader::parse_decision(&content, 2)
            .unwrap_or_else(|e| unreachable!("parse failed: {e}"));
        assert_eq!(decision.relevant, expect_relevant);
        assert_eq!(decision.irrelevant, expect_irrelevant);
    }

    #[test]
    fn test_parse_decision_invalid_json() {
        assert!(LlmGrader::parse_decision("not json", 2).is_err());
    }

    #[test]
    fn test_parse_decision_code_fence() {
        let content = "```json\n{\"thought_process\": \"x\", \"relevant\": [], \"irrelevant\": [0], \"verdict\": \"insufficient\"}\n```";
        let decision = LlmGrader::parse_decision(content, 1)
            .unwrap_or_else(|e| unreachable!("parse failed: {e}"));
        assert_eq!(decision.verdict, Verdict::Insufficient);
    }
}
