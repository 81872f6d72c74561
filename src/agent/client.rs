//! Provider construction for the loop's LLM-backed components.
//!
//! The planner, grader, and synthesizer differ only in prompt, model,
//! and token budget; they share one provider handle for transport. This
//! module resolves the configured provider name to that shared handle.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiProvider;
use crate::error::AgentError;

/// Resolves the configured provider into a handle shared by the
/// planner, grader, and synthesizer.
///
/// Currently `"openai"` (the default) is the only backend, covering any
/// OpenAI-compatible API via the base URL override.
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config))),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
