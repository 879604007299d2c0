//! Error taxonomy for the orchestration engine
//!
//! Classification functions are total and never return errors; everything
//! here belongs to the I/O-performing callers (LLM chat, search dispatch,
//! sentiment requests). Each variant carries a machine-readable code so the
//! caller can surface a structured terminal error after retry budgets are
//! exhausted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed caller input. Never retried, surfaced immediately.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing or unusable credential/endpoint configuration. Fatal for the
    /// request; retrying cannot help.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure, timeout, or 5xx from a collaborator. Retried per
    /// the owning component's policy.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// Model output did not match the expected structured format.
    #[error("parse error: {0}")]
    Parse(String),

    /// Sentiment retry budget exhausted without a usable judgment. A partial
    /// or guessed map is never substituted for this.
    #[error("sentiment analysis failed: {0}")]
    SentimentFailed(String),
}

impl EngineError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn transport_with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Machine-readable code for the UI boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Configuration(_) => "configuration_error",
            Self::Transport { .. } => "transport_error",
            Self::Parse(_) => "parse_error",
            Self::SentimentFailed(_) => "sentiment_failed",
        }
    }

    /// Whether the owning retry loop may consume an attempt on this error.
    /// 4xx-class collaborator responses arrive as `Validation` and propagate
    /// without retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Parse(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::Validation("x".into()).code(), "validation_error");
        assert_eq!(EngineError::transport("x").code(), "transport_error");
        assert_eq!(EngineError::Parse("x".into()).code(), "parse_error");
        assert_eq!(
            EngineError::SentimentFailed("x".into()).code(),
            "sentiment_failed"
        );
    }

    #[test]
    fn retryability_split() {
        assert!(EngineError::transport_with_status("503", 503).is_retryable());
        assert!(EngineError::Parse("bad json".into()).is_retryable());
        assert!(!EngineError::Validation("bad q".into()).is_retryable());
        assert!(!EngineError::Configuration("no key".into()).is_retryable());
    }
}
