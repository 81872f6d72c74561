//! Error taxonomy for the answering loop and its collaborators.
//!
//! Sub-component failures are classified here so the controller can apply
//! its degradation policy: transient retrieval and grading failures steer
//! the loop toward giving up gracefully, while synthesis and storage
//! failures surface to the caller.

use thiserror::Error;

/// Errors produced by the agent system.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for the LLM provider.
    #[error("no API key configured (set OPENAI_API_KEY or RFP_API_KEY)")]
    ApiKeyMissing,

    /// The configured provider name is not recognized.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// An LLM API request failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error detail from the provider.
        message: String,
        /// HTTP status code, if one was received.
        status: Option<u16>,
    },

    /// A model response could not be parsed into the expected schema.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// What went wrong while parsing.
        message: String,
        /// The raw response content, for diagnostics.
        content: String,
    },

    /// The Index Store is unreachable or returned a malformed response.
    ///
    /// Transient: the controller retries with backoff, then degrades to
    /// giving up rather than failing the request.
    #[error("index store unavailable: {message}")]
    RetrievalUnavailable {
        /// Error detail from the retrieval layer.
        message: String,
    },

    /// Relevance grading failed. The affected batch is treated as
    /// irrelevant; the cycle continues.
    #[error("relevance grading failed: {message}")]
    Grading {
        /// Error detail from the grader.
        message: String,
    },

    /// Query planning failed. Treated as a decision to give up.
    #[error("query planning failed: {message}")]
    Planning {
        /// Error detail from the planner.
        message: String,
    },

    /// Answer synthesis failed. Fatal to the request: no safe degraded
    /// answer exists.
    #[error("answer synthesis failed: {message}")]
    Synthesis {
        /// Error detail from the synthesizer.
        message: String,
    },

    /// The Conversation Store rejected a read or append.
    #[error("conversation store error: {message}")]
    Storage {
        /// Error detail from the store.
        message: String,
    },

    /// The calling context cancelled the request. No turn is persisted.
    #[error("request cancelled")]
    Cancelled,

    /// An external call exceeded its timeout. Treated identically to a
    /// transient failure of that call.
    #[error("external call timed out after {seconds}s")]
    Timeout {
        /// The timeout that was exceeded, in seconds.
        seconds: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::RetrievalUnavailable {
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "index store unavailable: connection refused"
        );

        let err = AgentError::Timeout { seconds: 120 };
        assert_eq!(err.to_string(), "external call timed out after 120s");
    }

    #[test]
    fn test_api_key_missing_display() {
        assert!(AgentError::ApiKeyMissing.to_string().contains("RFP_API_KEY"));
    }
}
