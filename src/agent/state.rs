//! Per-request loop state.
//!
//! A [`LoopState`] is exclusively owned by one controller for the
//! duration of one answering cycle and destroyed when the cycle ends.
//! Only the final answer and its citations survive (as a persisted
//! [`ChatTurn`](crate::session::ChatTurn)); search attempts are
//! working state.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::retrieval::{Passage, PassageKey, SearchScope};
use crate::session::ChatTurn;

/// A question entering the answering loop.
#[derive(Debug, Clone)]
pub struct Question {
    /// Session the question belongs to.
    pub session_id: String,
    /// The question text, immutable for the whole cycle.
    pub text: String,
    /// Optional scope: restrict search to these ingested documents.
    pub document_ids: Vec<String>,
}

impl Question {
    /// Creates an unscoped question.
    #[must_use]
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            document_ids: Vec::new(),
        }
    }

    /// Returns the search scope derived from the question's document filter.
    #[must_use]
    pub fn scope(&self) -> SearchScope {
        SearchScope::for_documents(self.document_ids.clone())
    }
}

/// Grader verdict over the cycle's relevant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The relevant set plausibly supports a complete answer.
    Sufficient,
    /// More evidence is needed.
    Insufficient,
}

/// One completed search/grade iteration.
///
/// Created by the controller per loop iteration; discarded when the
/// cycle ends.
#[derive(Debug, Clone)]
pub struct SearchAttempt {
    /// 0-based iteration index.
    pub attempt_index: usize,
    /// The query that was issued.
    pub query: String,
    /// Passages returned by the Index Store, graded.
    pub results: Vec<Passage>,
    /// Grader verdict after this attempt.
    pub verdict: Verdict,
    /// How many passages from this attempt were newly graded relevant.
    pub newly_relevant: usize,
    /// The grader's written rationale, fed back to the planner.
    pub rationale: String,
}

/// State for one answering cycle, exclusively owned by the controller.
#[derive(Debug)]
pub struct LoopState {
    /// The question being answered.
    pub question: Question,
    /// Bounded window of recent conversation turns, most recent last.
    pub history: Vec<ChatTurn>,
    /// Completed search attempts, in order.
    pub attempts: Vec<SearchAttempt>,
    /// Passages graded relevant so far. Grows monotonically: passages
    /// are never removed once admitted.
    accumulated_relevant: Vec<Passage>,
    /// Keys of every passage retrieved this cycle, fed to the retrieval
    /// exclusion filter.
    seen: HashSet<PassageKey>,
    /// Per-cycle grade cache: identical (question, passage) pairs always
    /// resolve to the same relevance within a cycle.
    grade_cache: HashMap<PassageKey, bool>,
    /// Number of completed search/grade iterations.
    pub iteration_count: usize,
}

impl LoopState {
    /// Initializes state for a new cycle: empty attempts, empty relevant
    /// set, iteration count zero.
    #[must_use]
    pub fn new(question: Question, history: Vec<ChatTurn>) -> Self {
        Self {
            question,
            history,
            attempts: Vec::new(),
            accumulated_relevant: Vec::new(),
            seen: HashSet::new(),
            grade_cache: HashMap::new(),
            iteration_count: 0,
        }
    }

    /// Passages graded relevant so far this cycle.
    #[must_use]
    pub fn accumulated_relevant(&self) -> &[Passage] {
        &self.accumulated_relevant
    }

    /// Returns the cached relevance for a passage, if it was graded
    /// earlier this cycle.
    #[must_use]
    pub fn cached_grade(&self, key: &PassageKey) -> Option<bool> {
        self.grade_cache.get(key).copied()
    }

    /// Records a graded passage, merging newly relevant ones into the
    /// accumulated set. Returns `true` if the passage was newly admitted
    /// as relevant.
    ///
    /// Re-grading an already-cached passage never changes its verdict or
    /// duplicates it in the relevant set.
    pub fn record_graded(&mut self, passage: Passage, relevant: bool) -> bool {
        let key = passage.key();
        self.seen.insert(key.clone());
        if self.grade_cache.contains_key(&key) {
            // Cached: the set only grows, never re-admits.
            return false;
        }
        self.grade_cache.insert(key, relevant);
        if relevant {
            let mut admitted = passage;
            admitted.graded_relevant = Some(true);
            self.accumulated_relevant.push(admitted);
            true
        } else {
            false
        }
    }

    /// Marks a passage key as seen without grading it (retrieval
    /// exclusion only).
    pub fn mark_seen(&mut self, key: PassageKey) {
        self.seen.insert(key);
    }

    /// Search scope for the next retrieval: the question's document
    /// filter plus exclusion of every passage already seen this cycle.
    #[must_use]
    pub fn next_scope(&self) -> SearchScope {
        self.question.scope().excluding(&self.seen)
    }

    /// Records a completed attempt and advances the iteration count.
    pub fn record_attempt(&mut self, attempt: SearchAttempt) {
        self.attempts.push(attempt);
        self.iteration_count += 1;
    }

    /// Queries already issued this cycle.
    #[must_use]
    pub fn prior_queries(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.query.as_str()).collect()
    }
}
