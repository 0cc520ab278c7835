//! OpenAI-compatible chat-completions client behind an object-safe
//! trait so the engine can be exercised with fakes.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::settings::SettingsStore;

use super::types::{
    ApiErrorResponse, ChatCompletionResponse, ChatRequest, ChatRequestMessage,
};

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Provider failures, already classified. Raw transport errors never
/// leave this module.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model credential is missing or rejected")]
    Auth,
    #[error("model provider is rate limiting requests")]
    RateLimited,
    #[error("model provider unavailable: {0}")]
    Unavailable(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected model response: {0}")]
    Unexpected(String),
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError>;
}

pub struct HttpModelClient {
    http: reqwest::Client,
    settings: Arc<SettingsStore>,
}

impl HttpModelClient {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> ModelError {
    let detail = serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .and_then(|resp| resp.error)
        .map(|err| err.message)
        .unwrap_or_else(|| status.to_string());

    match status.as_u16() {
        401 | 403 => ModelError::Auth,
        429 => ModelError::RateLimited,
        500..=599 => ModelError::Unavailable(detail),
        _ => ModelError::Unexpected(detail),
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let config = self.settings.model();
        if config.api_key.trim().is_empty() {
            return Err(ModelError::Auth);
        }

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &config.model,
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatRequestMessage {
                    role: "user",
                    content: &request.user_message,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&config.api_key)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ModelError::Unavailable("request timed out".into())
                } else {
                    ModelError::Network(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ModelError::Unexpected(err.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Unexpected("response contained no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_taxonomy() {
        use reqwest::StatusCode;

        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            ModelError::Auth
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            ModelError::Auth
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ModelError::RateLimited
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            ModelError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, ""),
            ModelError::Unexpected(_)
        ));
    }

    #[test]
    fn error_body_message_is_surfaced() {
        let body = r#"{"error":{"message":"model overloaded"}}"#;
        match classify_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, body) {
            ModelError::Unavailable(detail) => assert_eq!(detail, "model overloaded"),
            other => panic!("unexpected classification: {other:?}"),
        }
    }
}
