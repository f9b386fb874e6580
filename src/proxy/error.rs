//! Handler error taxonomy and the uniform failure response

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::ChatRequestError;

/// The only error text a caller ever sees
pub const GENERIC_ERROR_MESSAGE: &str = "There was an error processing your request";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("upstream API key is not configured")]
    Configuration,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("query flagged by moderation (categories: {categories:?})")]
    Moderation { categories: Vec<String> },

    #[error("query too large: {count} tokens, limit is {limit}")]
    QuotaExceeded { count: usize, limit: usize },

    #[error("{endpoint} endpoint returned {status}: {body}")]
    Upstream {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{0}")]
    Unknown(String),
}

impl ChatError {
    /// Short label used as the `error_kind` log field
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Configuration => "configuration",
            ChatError::InvalidRequest(_) => "invalid_request",
            ChatError::Moderation { .. } => "moderation",
            ChatError::QuotaExceeded { .. } => "quota_exceeded",
            ChatError::Upstream { .. } => "upstream",
            ChatError::Unknown(_) => "unknown",
        }
    }
}

impl From<ChatRequestError> for ChatError {
    fn from(e: ChatRequestError) -> Self {
        ChatError::InvalidRequest(e.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Unknown(format!("upstream request failed: {}", e))
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": GENERIC_ERROR_MESSAGE })),
        )
            .into_response()
    }
}
