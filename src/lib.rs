//! RFP-Agent: agentic retrieval-augmented answering over proposal documents.
//!
//! Answers natural-language questions about ingested proposal (RFP)
//! documents with cited evidence. The core is a bounded iterative loop:
//! a planner decides what to search for, a retriever queries the external
//! Index Store, a grader judges which passages are relevant and whether
//! they suffice, and a synthesizer produces the final answer with
//! citations resolved to document/page identifiers.
//!
//! # Architecture
//!
//! ```text
//! Question → ChatService
//!   ├── SessionManager (bounded recent history from the Conversation Store)
//!   └── LoopController (per-request state machine)
//!         ├── QueryPlanner     → next search query | answer | give up
//!         ├── RetrieverGateway → scored passages from the Index Store
//!         ├── RelevanceGrader  → relevant/irrelevant + sufficiency verdict
//!         └── AnswerSynthesizer → answer text + citations
//! ```
//!
//! The loop terminates after a configurable maximum number of search
//! attempts regardless of planner or grader behavior, bounding external
//! call cost per question. Document extraction, chunking, and indexing
//! are external collaborators and not part of this crate.

pub mod agent;
pub mod cli;
pub mod error;
pub mod retrieval;
pub mod service;
pub mod session;

pub use agent::config::AgentConfig;
pub use agent::controller::{CycleOutcome, LoopController};
pub use agent::grader::{GradeDecision, LlmGrader, RelevanceGrader};
pub use agent::planner::{LlmPlanner, NextAction, PlanInput, QueryPlanner};
pub use agent::state::{LoopState, Question, SearchAttempt, Verdict};
pub use agent::synthesizer::{AnswerSynthesizer, LlmSynthesizer, SynthesizedAnswer};
pub use error::AgentError;
pub use retrieval::{Citation, HttpRetrieverGateway, Passage, PassageKey, RetrieverGateway, SearchScope};
pub use service::{ChatError, ChatResponse, ChatService};
pub use session::{ChatTurn, ConversationStore, SessionManager, TurnRole};
