use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatRequestMessage<'a>>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Serialize)]
pub struct ChatRequestMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Deserialize)]
pub struct ChatMessage {
    pub content: String,
}

/// Error body shape most OpenAI-compatible servers return.
#[derive(Deserialize)]
pub struct ApiErrorResponse {
    pub error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}
