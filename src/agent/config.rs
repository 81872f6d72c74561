//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! Defaults are conservative: the iteration ceiling and retry counts bound
//! latency and external-call cost per question.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default maximum search/grade iterations per answering cycle.
const DEFAULT_MAX_ITERATIONS: usize = 3;
/// Default max retries for a failed Index Store call.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay for retry backoff (doubled per retry).
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
/// Default per-call timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default passages requested per search.
const DEFAULT_TOP_K: usize = 5;
/// Default bounded history window, in turns.
const DEFAULT_HISTORY_WINDOW: usize = 10;
/// Default planner max tokens.
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 512;
/// Default grader max tokens. Set high enough for the grader's written
/// rationale over a full passage batch.
const DEFAULT_GRADER_MAX_TOKENS: u32 = 2048;
/// Default synthesizer max tokens.
const DEFAULT_SYNTHESIZER_MAX_TOKENS: u32 = 4096;

/// Configuration for the answering loop and its LLM-backed components.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for the query planner.
    pub planner_model: String,
    /// Model for the relevance grader.
    pub grader_model: String,
    /// Model for the answer synthesizer.
    pub synthesizer_model: String,
    /// Hard ceiling on search/grade iterations per cycle.
    pub max_iterations: usize,
    /// Maximum retry attempts for a failed retrieval call.
    pub max_retries: u32,
    /// Base delay for retrieval retry backoff, doubled per attempt.
    pub retry_backoff: Duration,
    /// Timeout applied to every external call (LLM and Index Store).
    pub timeout: Duration,
    /// Passages requested from the Index Store per search.
    pub top_k: usize,
    /// Maximum prior turns supplied as planner/synthesizer context.
    pub history_window: usize,
    /// Maximum tokens for planner responses.
    pub planner_max_tokens: u32,
    /// Maximum tokens for grader responses.
    pub grader_max_tokens: u32,
    /// Maximum tokens for synthesizer responses.
    pub synthesizer_max_tokens: u32,
    /// Directory containing prompt template files.
    ///
    /// When set, system prompts are loaded from markdown files in this
    /// directory, falling back to compiled-in defaults for any missing
    /// files.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    planner_model: Option<String>,
    grader_model: Option<String>,
    synthesizer_model: Option<String>,
    max_iterations: Option<usize>,
    max_retries: Option<u32>,
    retry_backoff: Option<Duration>,
    timeout: Option<Duration>,
    top_k: Option<usize>,
    history_window: Option<usize>,
    planner_max_tokens: Option<u32>,
    grader_max_tokens: Option<u32>,
    synthesizer_max_tokens: Option<u32>,
    prompt_dir: Option<PathBuf>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("RFP_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("RFP_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("RFP_BASE_URL"))
                .ok();
        }
        if self.planner_model.is_none() {
            self.planner_model = std::env::var("RFP_PLANNER_MODEL").ok();
        }
        if self.grader_model.is_none() {
            self.grader_model = std::env::var("RFP_GRADER_MODEL").ok();
        }
        if self.synthesizer_model.is_none() {
            self.synthesizer_model = std::env::var("RFP_SYNTHESIZER_MODEL").ok();
        }
        if self.max_iterations.is_none() {
            self.max_iterations = std::env::var("RFP_MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.max_retries.is_none() {
            self.max_retries = std::env::var("RFP_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.top_k.is_none() {
            self.top_k = std::env::var("RFP_TOP_K").ok().and_then(|v| v.parse().ok());
        }
        if self.history_window.is_none() {
            self.history_window = std::env::var("RFP_HISTORY_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("RFP_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the grader model.
    #[must_use]
    pub fn grader_model(mut self, model: impl Into<String>) -> Self {
        self.grader_model = Some(model.into());
        self
    }

    /// Sets the synthesizer model.
    #[must_use]
    pub fn synthesizer_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer_model = Some(model.into());
        self
    }

    /// Sets the iteration ceiling.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the max retrieval retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the retry backoff base delay.
    #[must_use]
    pub const fn retry_backoff(mut self, delay: Duration) -> Self {
        self.retry_backoff = Some(delay);
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the passages requested per search.
    #[must_use]
    pub const fn top_k(mut self, n: usize) -> Self {
        self.top_k = Some(n);
        self
    }

    /// Sets the bounded history window.
    #[must_use]
    pub const fn history_window(mut self, n: usize) -> Self {
        self.history_window = Some(n);
        self
    }

    /// Sets the planner max tokens.
    #[must_use]
    pub const fn planner_max_tokens(mut self, n: u32) -> Self {
        self.planner_max_tokens = Some(n);
        self
    }

    /// Sets the grader max tokens.
    #[must_use]
    pub const fn grader_max_tokens(mut self, n: u32) -> Self {
        self.grader_max_tokens = Some(n);
        self
    }

    /// Sets the synthesizer max tokens.
    #[must_use]
    pub const fn synthesizer_max_tokens(mut self, n: u32) -> Self {
        self.synthesizer_max_tokens = Some(n);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            planner_model: self
                .planner_model
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            grader_model: self.grader_model.unwrap_or_else(|| "gpt-4o".to_string()),
            synthesizer_model: self
                .synthesizer_model
                .unwrap_or_else(|| "gpt-4o".to_string()),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff: self
                .retry_backoff
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS)),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            history_window: self.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW),
            planner_max_tokens: self.planner_max_tokens.unwrap_or(DEFAULT_PLANNER_MAX_TOKENS),
            grader_max_tokens: self.grader_max_tokens.unwrap_or(DEFAULT_GRADER_MAX_TOKENS),
            synthesizer_max_tokens: self
                .synthesizer_max_tokens
                .unwrap_or(DEFAULT_SYNTHESIZER_MAX_TOKENS),
            prompt_dir: self.prompt_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.history_window, DEFAULT_HISTORY_WINDOW);
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = AgentConfig::builder().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .provider("custom")
            .planner_model("gpt-4o-mini")
            .max_iterations(5)
            .top_k(10)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "custom");
        assert_eq!(config.planner_model, "gpt-4o-mini");
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.top_k, 10);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
