//! Answer synthesizer.
//!
//! Composes the final answer from the cycle's accumulated relevant
//! passages. The model cites sources with `[Sn]` markers; citations are
//! extracted by scanning the answer text so every citation points at a
//! passage that actually survived grading.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::prompt::INSUFFICIENT_INFORMATION_ANSWER;
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::error::AgentError;
use crate::retrieval::{Citation, Passage, PassageKey};
use crate::session::ChatTurn;

// Literal pattern, compiled once.
#[allow(clippy::expect_used)]
static CITATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[S(\d+)\]").expect("citation marker pattern is valid")
});

/// A synthesized answer with the citations its text references.
#[derive(Debug, Clone)]
pub struct SynthesizedAnswer {
    /// Answer text, with `[Sn]` markers left in place.
    pub text: String,
    /// Citations for each distinct marker, in order of first appearance.
    pub citations: Vec<Citation>,
}

impl SynthesizedAnswer {
    /// The fixed fallback answer for cycles that found no relevant
    /// evidence.
    #[must_use]
    pub fn insufficient() -> Self {
        Self {
            text: INSUFFICIENT_INFORMATION_ANSWER.to_string(),
            citations: Vec::new(),
        }
    }
}

/// Trait for answer synthesis.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    /// Composes an answer from the relevant passages.
    ///
    /// With an empty `relevant` set the fixed insufficient-information
    /// answer is returned without a model call.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Synthesis`] on model failures; the cycle
    /// cannot recover, so this surfaces to the caller.
    async fn synthesize(
        &self,
        question: &str,
        relevant: &[Passage],
        history: &[ChatTurn],
    ) -> Result<SynthesizedAnswer, AgentError>;
}

/// Extracts citations from `[Sn]` markers in the answer text.
///
/// Markers are 1-based into `relevant`. Out-of-range markers are
/// dropped, and repeated references to the same passage collapse to one
/// citation at the position of first appearance.
#[must_use]
pub fn extract_citations(text: &str, relevant: &[Passage]) -> Vec<Citation> {
    let mut seen: HashSet<PassageKey> = HashSet::new();
    let mut citations = Vec::new();
    for cap in CITATION_MARKER.captures_iter(text) {
        let Some(n) = cap.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) else {
            continue;
        };
        if n == 0 || n > relevant.len() {
            warn!(marker = n, sources = relevant.len(), "answer cited an unknown source");
            continue;
        }
        let passage = &relevant[n - 1];
        if seen.insert(passage.key()) {
            citations.push(Citation::from_passage(passage));
        }
    }
    citations
}

/// LLM-backed [`AnswerSynthesizer`].
pub struct LlmSynthesizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl LlmSynthesizer {
    /// Creates a synthesizer from configuration and its system prompt.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            provider,
            model: config.synthesizer_model.clone(),
            max_tokens: config.synthesizer_max_tokens,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for LlmSynthesizer {
    fn name(&self) -> &'static str {
        "synthesizer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[async_trait]
impl AnswerSynthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        relevant: &[Passage],
        history: &[ChatTurn],
    ) -> Result<SynthesizedAnswer, AgentError> {
        if relevant.is_empty() {
            debug!("no relevant passages, returning fallback answer");
            return Ok(SynthesizedAnswer::insufficient());
        }

        let user_msg = super::prompt::build_synthesizer_prompt(question, relevant, history);
        let response = self
            .execute(self.provider.as_ref(), &user_msg)
            .await
            .map_err(|e| AgentError::Synthesis {
                message: e.to_string(),
            })?;

        let citations = extract_citations(&response.content, relevant);
        debug!(
            citations = citations.len(),
            chars = response.content.len(),
            "synthesized answer"
        );
        Ok(SynthesizedAnswer {
            text: response.content,
            citations,
        })
    }
}

impl std::fmt::Debug for LlmSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSynthesizer")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

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

    fn passage(doc: &str, loc: &str) -> Passage {
        Passage {
            document_id: doc.to_string(),
            location: loc.to_string(),
            text: "some passage text".to_string(),
            score: 0.9,
            graded_relevant: Some(true),
        }
    }

    fn synthesizer(content: &str) -> LlmSynthesizer {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        LlmSynthesizer::new(
            Arc::new(FixedProvider {
                content: content.to_string(),
            }),
            &config,
            super::super::prompt::SYNTHESIZER_SYSTEM_PROMPT.to_string(),
        )
    }

    #[tokio::test]
    async fn test_empty_relevant_set_returns_fallback() {
        let s = synthesizer("The deadline is June 1 [S1].");
        let answer = s
            .synthesize("q", &[], &[])
            .await
            .unwrap_or_else(|e| unreachable!("synthesize failed: {e}"));
        assert_eq!(answer.text, INSUFFICIENT_INFORMATION_ANSWER);
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_extracts_citations() {
        let s = synthesizer("The deadline is June 1 [S1], per the cover letter [S2].");
        let relevant = vec![passage("rfp.pdf", "p.3"), passage("cover.pdf", "p.1")];
        let answer = s
            .synthesize("When is the deadline?", &relevant, &[])
            .await
            .unwrap_or_else(|e| unreachable!("synthesize failed: {e}"));
        assert_eq!(answer.citations.len(), 2);
        assert_eq!(answer.citations[0].document_id, "rfp.pdf");
        assert_eq!(answer.citations[1].document_id, "cover.pdf");
    }

    #[test]
    fn test_extract_citations_drops_out_of_range() {
        let relevant = vec![passage("a.pdf", "p.1")];
        let citations = extract_citations("see [S1] and [S2] and [S0]", &relevant);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].document_id, "a.pdf");
    }

    #[test]
    fn test_extract_citations_dedupes_by_first_appearance() {
        let relevant = vec![passage("a.pdf", "p.1"), passage("b.pdf", "p.2")];
        let citations = extract_citations("[S2] then [S1] then [S2] again", &relevant);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].document_id, "b.pdf");
        assert_eq!(citations[1].document_id, "a.pdf");
    }

    #[test]
    fn test_extract_citations_no_markers() {
        let relevant = vec![passage("a.pdf", "p.1")];
        assert!(extract_citations("an answer without markers", &relevant).is_empty());
    }

    proptest! {
        /// Every extracted citation points at a passage in the relevant set.
        #[test]
        fn prop_citations_subset_of_relevant(text in ".*", n in 0usize..6) {
            let relevant: Vec<Passage> = (0..n)
                .map(|i| passage(&format!("doc{i}.pdf"), &format!("p.{i}")))
                .collect();
            let keys: HashSet<PassageKey> = relevant.iter().map(Passage::key).collect();
            for citation in extract_citations(&text, &relevant) {
                prop_assert!(keys.contains(&citation.key()));
            }
        }
    }
}
