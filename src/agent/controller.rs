//! Loop controller.
//!
//! Drives one answering cycle as a bounded state machine over the
//! planner, retriever, grader, and synthesizer. The controller owns the
//! non-negotiable guarantees: the iteration ceiling, retrieval retries
//! with backoff, the grade cache, and cancellation at every await
//! point. Component failures degrade the cycle (a failed grade marks
//! the batch irrelevant, a failed plan gives up) rather than aborting
//! it; only synthesis failures and cancellation surface as errors.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::grader::RelevanceGrader;
use super::planner::{NextAction, PlanInput, QueryPlanner};
use super::state::{LoopState, Question, SearchAttempt, Verdict};
use super::synthesizer::{AnswerSynthesizer, SynthesizedAnswer};
use crate::error::AgentError;
use crate::retrieval::{Passage, RetrieverGateway};
use crate::session::ChatTurn;

/// Where the cycle currently is.
#[derive(Debug)]
enum Phase {
    Planning,
    Searching(String),
    Grading {
        query: String,
        results: Vec<Passage>,
    },
    Answering,
    GivingUp,
}

/// The result of one completed answering cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// The synthesized answer and its citations.
    pub answer: SynthesizedAnswer,
    /// Every search attempt the cycle made, in order.
    pub attempts: Vec<SearchAttempt>,
    /// Whether the cycle gave up rather than deciding it had enough
    /// evidence. The answer may still be substantive if partial
    /// evidence was gathered.
    pub gave_up: bool,
}

/// Orchestrates one question-answering cycle.
pub struct LoopController {
    planner: Arc<dyn QueryPlanner>,
    grader: Arc<dyn RelevanceGrader>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    retriever: Arc<dyn RetrieverGateway>,
    config: AgentConfig,
}

impl LoopController {
    /// Creates a controller over the four components.
    #[must_use]
    pub fn new(
        planner: Arc<dyn QueryPlanner>,
        grader: Arc<dyn RelevanceGrader>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        retriever: Arc<dyn RetrieverGateway>,
        config: AgentConfig,
    ) -> Self {
        Self {
            planner,
            grader,
            synthesizer,
            retriever,
            config,
        }
    }

    /// Runs one cycle to completion.
    ///
    /// Terminates after at most `max_iterations` search attempts; by
    /// then the cycle is forced into answering from whatever evidence
    /// accumulated.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if `cancel` fires at any await
    /// point, or [`AgentError::Synthesis`] if the final answer cannot
    /// be composed. All other component failures are absorbed into the
    /// cycle's control flow.
    pub async fn run(
        &self,
        question: Question,
        history: Vec<ChatTurn>,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, AgentError> {
        let mut state = LoopState::new(question, history);
        let mut phase = Phase::Planning;

        loop {
            match phase {
                Phase::Planning => {
                    if state.iteration_count >= self.config.max_iterations {
                        info!(
                            iterations = state.iteration_count,
                            "iteration ceiling reached, answering from accumulated evidence"
                        );
                        phase = Phase::Answering;
                        continue;
                    }
                    phase = self.plan_phase(&state, cancel).await?;
                }
                Phase::Searching(query) => {
                    phase = self.search_phase(query, &state, cancel).await?;
                }
                Phase::Grading { query, results } => {
                    self.grade_phase(query, results, &mut state, cancel).await?;
                    phase = Phase::Planning;
                }
                Phase::Answering | Phase::GivingUp => {
                    let gave_up = matches!(phase, Phase::GivingUp);
                    let answer = self
                        .with_limits(
                            cancel,
                            self.synthesizer.synthesize(
                                &state.question.text,
                                state.accumulated_relevant(),
                                &state.history,
                            ),
                        )
                        .await?;
                    info!(
                        attempts = state.attempts.len(),
                        citations = answer.citations.len(),
                        gave_up,
                        "cycle complete"
                    );
                    return Ok(CycleOutcome {
                        answer,
                        attempts: state.attempts,
                        gave_up,
                    });
                }
            }
        }
    }

    async fn plan_phase(
        &self,
        state: &LoopState,
        cancel: &CancellationToken,
    ) -> Result<Phase, AgentError> {
        let input = PlanInput {
            question: &state.question.text,
            history: &state.history,
            attempts: &state.attempts,
        };
        match self.with_limits(cancel, self.planner.plan(input)).await {
            Ok(NextAction::Search(query)) => {
                debug!(%query, iteration = state.iteration_count, "planned search");
                Ok(Phase::Searching(query))
            }
            Ok(NextAction::Answer) => Ok(Phase::Answering),
            Ok(NextAction::GiveUp) => Ok(Phase::GivingUp),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                warn!(error = %e, "planning failed, giving up");
                Ok(Phase::GivingUp)
            }
        }
    }

    /// Retrieval with bounded retries and exponential backoff. Every
    /// failure mode of the gateway is transient by contract, so retries
    /// apply uniformly; exhaustion gives up the cycle.
    async fn search_phase(
        &self,
        query: String,
        state: &LoopState,
        cancel: &CancellationToken,
    ) -> Result<Phase, AgentError> {
        let scope = state.next_scope();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .with_limits(
                    cancel,
                    self.retriever.search(&query, &scope, self.config.top_k),
                )
                .await;
            match result {
                Ok(results) => {
                    debug!(count = results.len(), %query, "retrieved passages");
                    return Ok(Phase::Grading { query, results });
                }
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.config.retry_backoff * 2u32.pow(attempt - 1);
                    warn!(error = %e, attempt, ?delay, "retrieval failed, retrying");
                    tokio::select! {
                        () = cancel.cancelled() => return Err(AgentError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempts = attempt, "retrieval exhausted retries, giving up");
                    return Ok(Phase::GivingUp);
                }
            }
        }
    }

    /// Grades the batch and records the attempt. Passages already graded
    /// this cycle are skipped via the grade cache, so a retriever that
    /// ignores the exclusion scope cannot cause re-grading. A grading
    /// failure records the whole batch as irrelevant with an
    /// insufficient verdict.
    async fn grade_phase(
        &self,
        query: String,
        results: Vec<Passage>,
        state: &mut LoopState,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let fresh: Vec<Passage> = results
            .iter()
            .filter(|p| state.cached_grade(&p.key()).is_none())
            .cloned()
            .collect();
        if fresh.len() < results.len() {
            debug!(
                cached = results.len() - fresh.len(),
                "skipping already-graded passages"
            );
        }

        let graded = self
            .with_limits(
                cancel,
                self.grader.grade(
                    &state.question.text,
                    &fresh,
                    state.accumulated_relevant(),
                    &state.attempts,
                ),
            )
            .await;

        let mut newly_relevant = 0usize;
        let (verdict, rationale) = match graded {
            Ok(decision) => {
                let relevant: std::collections::HashSet<usize> =
                    decision.relevant.iter().copied().collect();
                for (i, passage) in fresh.iter().enumerate() {
                    // Unmentioned indices count as irrelevant.
                    if state.record_graded(passage.clone(), relevant.contains(&i)) {
                        newly_relevant += 1;
                    }
                }
                (decision.verdict, decision.rationale)
            }
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                warn!(error = %e, "grading failed, treating batch as irrelevant");
                for passage in &fresh {
                    state.record_graded(passage.clone(), false);
                }
                (Verdict::Insufficient, format!("grading failed: {e}"))
            }
        };

        let attempt = SearchAttempt {
            attempt_index: state.iteration_count,
            query,
            results,
            verdict,
            newly_relevant,
            rationale,
        };
        info!(
            index = attempt.attempt_index,
            newly_relevant,
            verdict = ?attempt.verdict,
            "attempt complete"
        );
        state.record_attempt(attempt);
        Ok(())
    }

    /// Wraps a component call with the per-call timeout and cooperative
    /// cancellation. Timeouts surface as [`AgentError::Timeout`], which
    /// each phase treats like that component's own failure.
    async fn with_limits<T, F>(
        &self,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<T, AgentError>
    where
        F: Future<Output = Result<T, AgentError>>,
    {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        tokio::select! {
            () = cancel.cancelled() => Err(AgentError::Cancelled),
            result = tokio::time::timeout(self.config.timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => Err(AgentError::Timeout {
                    seconds: self.config.timeout.as_secs(),
                }),
            },
        }
    }
}

impl std::fmt::Debug for LoopController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
