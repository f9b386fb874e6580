//! OpenAI-compatible chat completion type definitions

use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;

/// Conversation role
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation message
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Inbound chat request body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
}

/// Reasons an inbound body is rejected
#[derive(Debug, thiserror::Error)]
pub enum ChatRequestError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("request body is not a valid chat request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no messages provided")]
    NoMessages,
}

impl ChatRequest {
    /// Parse and validate a raw request body
    ///
    /// A body is accepted only if it is a JSON object with a non-empty
    /// `messages` array whose entries all carry a known role and string content.
    pub fn from_slice(body: &[u8]) -> Result<Self, ChatRequestError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ChatRequestError::EmptyBody);
        }

        let request: ChatRequest = serde_json::from_slice(body)?;
        if request.messages.is_empty() {
            return Err(ChatRequestError::NoMessages);
        }

        Ok(request)
    }

    /// The message sent to moderation
    pub fn last_message(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }
}

/// Outbound chat completion request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub temperature: f64,
    pub stream: bool,
}

impl CompletionRequest {
    /// Build a streaming request with the policy's system prompt ahead of the conversation
    pub fn from_policy(policy: &PolicyConfig, conversation: Vec<ConversationMessage>) -> Self {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ConversationMessage::system(policy.system_prompt.clone()));
        messages.extend(conversation);

        Self {
            model: policy.model.clone(),
            messages,
            temperature: policy.temperature,
            stream: true,
        }
    }
}
