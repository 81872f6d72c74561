//! System prompts and template builders for the loop's LLM components.
//!
//! Prompts are the core instructions that define planner, grader, and
//! synthesizer behavior. Template builders format user messages with the
//! question, attempt history, and passage batches.

use std::fmt::Write;
use std::path::Path;

use crate::agent::state::SearchAttempt;
use crate::retrieval::Passage;
use crate::session::{ChatTurn, TurnRole};

/// System prompt for the query planner.
pub const PLANNER_SYSTEM_PROMPT: &str = r#"Generate a search query based on the user's question and what we've learned from previous search attempts (if any). Your search query should use keywords and phrases likely to appear in the proposal documents themselves.

Your input will look like this:
    User Question: <user question>
    Recent Conversation: <prior turns, if the question is a follow-up>
    Previous Search Attempts: <queries issued so far and the reviewer's analysis of each>

Your task:
1. If the question is a follow-up that uses pronouns or refers to earlier turns, resolve it against the recent conversation first.
2. Based on the previous reviews, understand what information we still need.
3. Generate a search query using keywords and phrases that would be found in the actual document text. Never repeat a query that was already issued.

### Output Format (JSON) ###

{"search_query": "the generated search query with relevant keywords and phrases"}

### Proposal Content Areas to Consider ###

- **Capabilities and Qualifications**: specific capabilities, qualifications, certifications, experience, past performance
- **Legal and Risk Considerations**: contract terms, terms and conditions, service-level agreements, termination conditions, renewal clauses
- **Financial Visibility**: revenue range, total contract value, payment terms, budget estimates
- **Evaluation and Submission Requirements**: deadline for submission, method of evaluation and scoring, proof of insurance, bonding, financial stability
- **Regulatory and Data Sensitivity**: PHI/PII or other sensitive data, data sovereignty, data residency, security clearances

### Examples ###

User Question: "What is the submission deadline for this RFP?"
{"search_query": "submission deadline due date submit proposals by closing date proposal due"}

User Question: "What are the technical requirements?"
{"search_query": "technical requirements system specifications software hardware infrastructure technology platform mandatory features"}

User Question: "What is the estimated budget for this project?"
{"search_query": "budget estimate cost ceiling maximum value total contract value pricing payment terms"}

Return ONLY the JSON object, no surrounding text."#;

/// System prompt for the relevance grader.
pub const GRADER_SYSTEM_PROMPT: &str = r#"Review these search results and determine which contain relevant information for answering the user's question. Judge topical relevance semantically, not by keyword overlap.

Your input will contain:
1. User Question: the question the user asked
2. Current Search Results: numbered passages to review now
3. Previously Vetted Results: passages already accepted (do not review these again)
4. Previous Attempts: earlier queries and your analysis of each

Respond with JSON:
{
  "thought_process": "Your analysis. Is this a general or specific question? Which passages are relevant and which are not? If we don't have enough information, be clear about what is missing and how the search could be improved. End by saying whether we can answer or should keep looking.",
  "relevant": [indices of useful passages],
  "irrelevant": [indices of passages that will not help],
  "verdict": "sufficient" or "insufficient"
}

The verdict judges the WHOLE evidence set gathered so far (previously vetted plus newly relevant), not just this batch: "sufficient" means the accumulated evidence plausibly supports a complete answer.

General guidance:
If a passage contains any amount of useful information related to the question, consider it relevant. Only discard passages that will not help construct the final answer. Do NOT discard passages with partially useful information - detailed responses are preferred over concise ones.

For specific questions (e.g. a single figure or date), only passages that speak to that exact point are relevant; discard the rest.

For general questions, consider all passages with semi-relevant information to be relevant, and lean toward "insufficient" on early attempts so more evidence is gathered for a comprehensive answer.

Return ONLY the JSON object, no surrounding text."#;

/// System prompt for the answer synthesizer.
pub const SYNTHESIZER_SYSTEM_PROMPT: &str = r#"You are a proposal analysis expert. Answer the user's question using ONLY the numbered source passages provided.

Rules:
1. Ground every factual claim in at least one provided passage, and mark it with the passage's citation marker, e.g. [S1] or [S2]. A claim may carry several markers.
2. Never cite a source that is not in the provided list, and never invent information that is not in the passages.
3. Write a clear narrative answer. Quote exact figures, dates, and terms from the passages where they matter.
4. If the passages only partially answer the question, answer what is supported and state plainly what the documents do not cover.
5. If the question is a follow-up, use the recent conversation to interpret it, but evidence may come only from the provided passages.

Output the answer text with inline [Sn] markers. No preamble, no closing remarks."#;

/// The fixed answer produced when the loop ends with no relevant
/// evidence. Hard contract: never a confident guess, never cited.
pub const INSUFFICIENT_INFORMATION_ANSWER: &str = "I couldn't find relevant information in the \
     proposal documents to answer your question. Please try rephrasing your question or check \
     if the information exists in the uploaded documents.";

/// Filename for the planner prompt template.
const PLANNER_FILENAME: &str = "planner.md";
/// Filename for the grader prompt template.
const GRADER_FILENAME: &str = "grader.md";
/// Filename for the synthesizer prompt template.
const SYNTHESIZER_FILENAME: &str = "synthesizer.md";

/// A set of system prompts for all loop components.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Each file is loaded independently — a missing
/// file uses its default.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// System prompt for the query planner.
    pub planner: String,
    /// System prompt for the relevance grader.
    pub grader: String,
    /// System prompt for the answer synthesizer.
    pub synthesizer: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to
    /// compiled-in defaults.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let load_file = |filename: &str, default: &str| -> String {
            prompt_dir
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            planner: load_file(PLANNER_FILENAME, PLANNER_SYSTEM_PROMPT),
            grader: load_file(GRADER_FILENAME, GRADER_SYSTEM_PROMPT),
            synthesizer: load_file(SYNTHESIZER_FILENAME, SYNTHESIZER_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            planner: PLANNER_SYSTEM_PROMPT.to_string(),
            grader: GRADER_SYSTEM_PROMPT.to_string(),
            synthesizer: SYNTHESIZER_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Formats recent conversation turns for planner/synthesizer context.
fn format_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return "No prior conversation.".to_string();
    }
    let mut out = String::new();
    for turn in history {
        let role = match turn.role {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
        };
        let _ = writeln!(out, "{role}: {}", turn.content);
    }
    out
}

/// Formats prior attempts (query + grader rationale) for the planner.
fn format_attempts(attempts: &[SearchAttempt]) -> String {
    if attempts.is_empty() {
        return "No previous search attempts.".to_string();
    }
    let mut out = String::new();
    for attempt in attempts {
        let _ = write!(
            out,
            "<Attempt {n}>\n   search_query: {query}\n   review: {review}\n</Attempt {n}>\n",
            n = attempt.attempt_index + 1,
            query = attempt.query,
            review = attempt.rationale,
        );
    }
    out
}

/// Formats a numbered passage batch.
fn format_passages(passages: &[Passage]) -> String {
    if passages.is_empty() {
        return "No results available.".to_string();
    }
    let mut out = String::new();
    for (i, p) in passages.iter().enumerate() {
        let _ = write!(
            out,
            "\nResult #{i}\n\
             Document: {doc}\n\
             Location: {loc}\n\
             <content>\n{text}\n</content>\n",
            doc = p.document_id,
            loc = p.location,
            text = p.text,
        );
    }
    out
}

/// Builds the user message for the query planner.
#[must_use]
pub fn build_planner_prompt(
    question: &str,
    history: &[ChatTurn],
    attempts: &[SearchAttempt],
) -> String {
    format!(
        "User Question: {question}\n\n\
         ### Recent Conversation ###\n{history}\n\
         ### Previous Search Attempts ###\n{attempts}",
        history = format_history(history),
        attempts = format_attempts(attempts),
    )
}

/// Builds the user message for the relevance grader.
#[must_use]
pub fn build_grader_prompt(
    question: &str,
    batch: &[Passage],
    vetted: &[Passage],
    attempts: &[SearchAttempt],
) -> String {
    format!(
        "User Question: {question}\n\n\
         <Current Search Results to review>\n{batch}\n<end current search results to review>\n\n\
         <previously vetted results, do not review>\n{vetted}\n<end previously vetted results, do not review>\n\n\
         <Previous Attempts>\n{attempts}\n<end Previous Attempts>",
        batch = format_passages(batch),
        vetted = format_passages(vetted),
        attempts = format_attempts(attempts),
    )
}

/// Builds the user message for the answer synthesizer.
///
/// Passages are numbered `[S1]..[Sn]`; the synthesizer marks claims with
/// these markers, which citation extraction later resolves.
#[must_use]
pub fn build_synthesizer_prompt(
    question: &str,
    relevant: &[Passage],
    history: &[ChatTurn],
) -> String {
    let mut sources = String::new();
    for (i, p) in relevant.iter().enumerate() {
        let _ = write!(
            sources,
            "\n[S{n}] Document: {doc} ({loc})\n<content>\n{text}\n</content>\n",
            n = i + 1,
            doc = p.document_id,
            loc = p.location,
            text = p.text,
        );
    }

    format!(
        "User Question: {question}\n\n\
         ### Recent Conversation ###\n{history}\n\
         ### Source Passages ###\n{sources}\n\
         Now write the answer with inline [Sn] citation markers.",
        history = format_history(history),
    )
}
