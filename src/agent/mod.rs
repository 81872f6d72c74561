//! Agentic answering loop for RFP-Agent-RS.
//!
//! Provides an LLM-powered retrieval-augmented workflow that searches
//! proposal documents iteratively until it can answer a question. Uses
//! a pluggable provider abstraction backed by OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! User question → LoopController
//!   ├── QueryPlanner (decides search / answer / give up)
//!   ├── RetrieverGateway (Index Store search, seen passages excluded)
//!   ├── RelevanceGrader (splits batch, judges sufficiency)
//!   │   └── relevant passages accumulate across attempts
//!   └── AnswerSynthesizer → cited answer
//! ```
//!
//! The loop runs at most `max_iterations` search attempts; by then the
//! controller forces an answer from whatever evidence accumulated.

pub mod client;
pub mod config;
pub mod controller;
pub mod grader;
pub mod message;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod state;
pub mod synthesizer;
pub mod traits;

// Re-export key types
pub use client::create_provider;
pub use config::AgentConfig;
pub use controller::{CycleOutcome, LoopController};
pub use grader::{GradeDecision, LlmGrader, RelevanceGrader};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use planner::{LlmPlanner, NextAction, PlanInput, QueryPlanner};
pub use prompt::{INSUFFICIENT_INFORMATION_ANSWER, PromptSet};
pub use provider::LlmProvider;
pub use state::{LoopState, Question, SearchAttempt, Verdict};
pub use synthesizer::{AnswerSynthesizer, LlmSynthesizer, SynthesizedAnswer, extract_citations};
pub use traits::Agent;
