//! Chat request handler: validate, budget, moderate, complete, stream

use axum::{
    body::{to_bytes, Body},
    http::Request,
    response::{IntoResponse, Response},
};
use std::time::Instant;

use super::error::ChatError;
use super::server::ProxyState;
use super::streaming::forward_event_stream;
use crate::api::{ChatRequest, CompletionRequest};
use crate::request_log::format_request_log;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Chat proxy handler
pub struct ChatHandler {
    state: ProxyState,
}

impl ChatHandler {
    pub fn new(state: ProxyState) -> Self {
        Self { state }
    }

    /// Handle an incoming chat request
    ///
    /// Every failure becomes the same generic 500 response; the detail only goes to the log.
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let start = Instant::now();

        match self.process(req).await {
            Ok(response) => {
                tracing::debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Completion stream started"
                );
                response
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    error_kind = e.kind(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Chat request failed"
                );
                e.into_response()
            }
        }
    }

    async fn process(&self, req: Request<Body>) -> Result<Response, ChatError> {
        let api_key = self.state.api_key.clone().ok_or(ChatError::Configuration)?;

        let body = to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| ChatError::InvalidRequest(format!("failed to read request body: {}", e)))?;
        let chat = ChatRequest::from_slice(&body)?;

        let policy = &self.state.config.policy;
        let token_count = self.count_tokens(&chat);
        tracing::info!("{}", format_request_log(&chat, token_count, policy.token_limit));

        let last = chat
            .last_message()
            .ok_or_else(|| ChatError::InvalidRequest("no messages provided".to_string()))?;
        let moderation = self.state.upstream.moderate(&api_key, &last.content).await?;
        if moderation.flagged {
            return Err(ChatError::Moderation {
                categories: moderation.flagged_categories(),
            });
        }

        if token_count >= policy.token_limit {
            return Err(ChatError::QuotaExceeded {
                count: token_count,
                limit: policy.token_limit,
            });
        }

        let request = CompletionRequest::from_policy(policy, chat.messages);
        let upstream = self.state.upstream.complete(&api_key, &request).await?;

        Ok(forward_event_stream(upstream))
    }

    /// Tokens of every message plus the system prompt
    fn count_tokens(&self, chat: &ChatRequest) -> usize {
        let conversation: usize = chat
            .messages
            .iter()
            .map(|m| self.state.tokenizer.count_tokens(&m.content))
            .sum();

        conversation + self.state.system_prompt_tokens
    }
}
