//! Client for the upstream moderation and completion endpoints

use secrecy::{ExposeSecret, SecretString};

use super::error::ChatError;
use crate::api::{CompletionRequest, ModerationRequest, ModerationResponse, ModerationResult};
use crate::config::UpstreamConfig;

/// Upstream provider endpoints sharing one pooled HTTP client
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    moderation_url: String,
    completion_url: String,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            http,
            moderation_url: config.moderation_url(),
            completion_url: config.completion_url(),
        }
    }

    /// Classify `input` and return the first moderation result
    pub async fn moderate(
        &self,
        api_key: &SecretString,
        input: &str,
    ) -> Result<ModerationResult, ChatError> {
        tracing::debug!(url = %self.moderation_url, input_len = input.len(), "Sending moderation request");

        let response = self
            .http
            .post(&self.moderation_url)
            .bearer_auth(api_key.expose_secret())
            .json(&ModerationRequest {
                input: input.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response, "moderation").await;
            return Err(ChatError::Upstream {
                endpoint: "moderation",
                status,
                body,
            });
        }

        let moderation: ModerationResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Unknown(format!("malformed moderation response: {}", e)))?;

        moderation
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Unknown("moderation response contained no results".to_string()))
    }

    /// Start a completion and return the response once headers arrive
    ///
    /// The body is left unread so it can be piped to the caller.
    pub async fn complete(
        &self,
        api_key: &SecretString,
        request: &CompletionRequest,
    ) -> Result<reqwest::Response, ChatError> {
        tracing::debug!(
            url = %self.completion_url,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .http
            .post(&self.completion_url)
            .bearer_auth(api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response, "completion").await;
            return Err(ChatError::Upstream {
                endpoint: "completion",
                status,
                body,
            });
        }

        tracing::debug!(
            status = %status,
            headers = ?response.headers(),
            "Received completion response"
        );

        Ok(response)
    }
}

/// Read an upstream error body; a failed read is logged and yields an empty body
async fn read_error_body(response: reqwest::Response, endpoint: &'static str) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(endpoint, status = %status, error = %e, "Failed to read upstream error body");
            String::new()
        }
    }
}
