//! Failure taxonomy surfaced across the engine boundary. Every variant
//! carries a message fit for the UI; raw provider errors stay inside
//! the llm module.

use serde::Serialize;
use thiserror::Error;

use crate::llm::ModelError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("nothing to analyze yet: capture the screen, speak, or type a question")]
    NoContext,
    #[error("you're out of credits: upgrade your plan to keep asking")]
    QuotaExceeded,
    #[error("your model API key is missing or invalid: update it in settings")]
    Auth,
    #[error("the model is rate limiting requests, try again shortly")]
    RateLimit,
    #[error("the model service is unavailable right now, try again in a moment")]
    ServiceUnavailable,
    #[error("couldn't reach the model service: check your connection")]
    Network,
    #[error("this request was superseded by a newer one")]
    Cancelled,
    #[error("something went wrong: {0}")]
    Unknown(String),
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::NoContext => "noContext",
            AnalysisError::QuotaExceeded => "quotaExceeded",
            AnalysisError::Auth => "auth",
            AnalysisError::RateLimit => "rateLimit",
            AnalysisError::ServiceUnavailable => "serviceUnavailable",
            AnalysisError::Network => "network",
            AnalysisError::Cancelled => "cancelled",
            AnalysisError::Unknown(_) => "unknown",
        }
    }

    /// Whether the caller may reasonably retry. The engine itself never
    /// auto-retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::RateLimit | AnalysisError::ServiceUnavailable | AnalysisError::Network
        )
    }
}

impl From<ModelError> for AnalysisError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Auth => AnalysisError::Auth,
            ModelError::RateLimited => AnalysisError::RateLimit,
            ModelError::Unavailable(_) => AnalysisError::ServiceUnavailable,
            ModelError::Network(_) => AnalysisError::Network,
            ModelError::Unexpected(detail) => AnalysisError::Unknown(detail),
        }
    }
}

/// Serializable form handed to the UI through command results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFailure {
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<AnalysisError> for AnalysisFailure {
    fn from(err: AnalysisError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_map_onto_taxonomy() {
        assert!(matches!(
            AnalysisError::from(ModelError::Auth),
            AnalysisError::Auth
        ));
        assert!(matches!(
            AnalysisError::from(ModelError::RateLimited),
            AnalysisError::RateLimit
        ));
        assert!(matches!(
            AnalysisError::from(ModelError::Unavailable("down".into())),
            AnalysisError::ServiceUnavailable
        ));
        assert!(matches!(
            AnalysisError::from(ModelError::Network("refused".into())),
            AnalysisError::Network
        ));
    }

    #[test]
    fn retryable_covers_only_transient_kinds() {
        assert!(AnalysisError::RateLimit.is_retryable());
        assert!(AnalysisError::Network.is_retryable());
        assert!(!AnalysisError::QuotaExceeded.is_retryable());
        assert!(!AnalysisError::Auth.is_retryable());
        assert!(!AnalysisError::Cancelled.is_retryable());
    }

    #[test]
    fn failure_payload_keeps_human_message() {
        let failure = AnalysisFailure::from(AnalysisError::QuotaExceeded);
        assert_eq!(failure.kind, "quotaExceeded");
        assert!(failure.message.contains("credits"));
    }
}
