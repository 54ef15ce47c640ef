//! OpenAI API data models for request/response handling.
//!
//! This module contains the wire types the gateway speaks externally.
//! Domain types live in `lmgate-core`; this module is the translation
//! layer, so swapping the wire schema means swapping this module and
//! nothing else.

use lmgate_core::{ChatMessage, ChatParams, ChatRole, ModelDescriptor, ModelSelector, ProviderError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Chat Completion Request Types
// =============================================================================

/// Request to /v1/chat/completions.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model id, or empty/"auto" for the first available model.
    #[serde(default)]
    pub model: String,
    /// Array of chat messages.
    pub messages: Vec<WireMessage>,
    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Top-p sampling parameter.
    pub top_p: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    pub stop: Option<Vec<String>>,
}

/// A single wire-format chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    /// Message content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Why an otherwise well-formed request could not be translated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The message array was empty.
    #[error("request must contain at least one message")]
    EmptyMessages,

    /// A message used a role the gateway does not relay.
    #[error("unsupported message role: {0:?}")]
    UnsupportedRole(String),
}

impl ChatCompletionRequest {
    /// Translate the wire request into the provider-agnostic form.
    ///
    /// # Errors
    ///
    /// Returns `RequestError` when the request is structurally valid JSON
    /// but semantically unusable.
    pub fn to_domain(&self) -> Result<(ModelSelector, Vec<ChatMessage>, ChatParams), RequestError> {
        if self.messages.is_empty() {
            return Err(RequestError::EmptyMessages);
        }

        let mut messages = Vec::with_capacity(self.messages.len());
        for wire in &self.messages {
            let role = ChatRole::parse(&wire.role)
                .ok_or_else(|| RequestError::UnsupportedRole(wire.role.clone()))?;
            messages.push(ChatMessage {
                role,
                content: wire.content.clone().unwrap_or_default(),
            });
        }

        let params = ChatParams {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stop: self.stop.clone().unwrap_or_default(),
        };

        Ok((ModelSelector::parse(&self.model), messages, params))
    }
}

// =============================================================================
// Chat Completion Response Types
// =============================================================================

/// Response from /v1/chat/completions (non-streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
}

/// A single chat completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: WireMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl ChatCompletionResponse {
    /// Build a complete assistant response.
    #[must_use]
    pub fn assistant(model: &str, content: String) -> Self {
        Self {
            id: completion_id(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: WireMessage {
                    role: "assistant".to_string(),
                    content: Some(content),
                },
                finish_reason: Some("stop".to_string()),
            }],
        }
    }
}

/// Streaming chunk from /v1/chat/completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChunkChoice>,
}

/// A single streaming choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Delta content in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    fn base(id: &str, model: &str, created: i64, delta: ChatDelta, finish: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChatChunkChoice {
                index: 0,
                delta,
                finish_reason: finish.map(str::to_string),
            }],
        }
    }

    /// First chunk of a stream, carrying only the assistant role.
    #[must_use]
    pub fn role_opening(id: &str, model: &str, created: i64) -> Self {
        Self::base(
            id,
            model,
            created,
            ChatDelta {
                role: Some("assistant".to_string()),
                content: None,
            },
            None,
        )
    }

    /// Content chunk relaying one provider fragment.
    #[must_use]
    pub fn content(id: &str, model: &str, created: i64, text: String) -> Self {
        Self::base(
            id,
            model,
            created,
            ChatDelta {
                role: None,
                content: Some(text),
            },
            None,
        )
    }

    /// Terminal chunk with the finish reason.
    #[must_use]
    pub fn finish(id: &str, model: &str, created: i64) -> Self {
        Self::base(
            id,
            model,
            created,
            ChatDelta {
                role: None,
                content: None,
            },
            Some("stop"),
        )
    }
}

/// Generate a completion id in the conventional `chatcmpl-` form.
#[must_use]
pub fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

// =============================================================================
// Models Endpoint Types
// =============================================================================

/// Response from /v1/models.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelsResponse {
    /// Build the OpenAI list shape from provider descriptors.
    #[must_use]
    pub fn from_descriptors(models: Vec<ModelDescriptor>) -> Self {
        Self {
            object: "list".to_string(),
            data: models.into_iter().map(ModelInfo::from).collect(),
        }
    }
}

/// Information about a single model (OpenAI format).
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<ModelDescriptor> for ModelInfo {
    fn from(model: ModelDescriptor) -> Self {
        Self {
            display_name: (model.display_name != model.id).then_some(model.display_name),
            id: model.id,
            object: "model".to_string(),
            created: 0,
            owned_by: model.family.unwrap_or_else(|| "lmgate".to_string()),
        }
    }
}

// =============================================================================
// Error Response Types
// =============================================================================

/// Error response matching the OpenAI format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail within an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
                code: None,
            },
        }
    }

    /// Create an error response with a code.
    pub fn with_code(
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
                code: Some(code.into()),
            },
        }
    }

    /// Malformed or untranslatable request body.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::new(reason, "invalid_request_error")
    }

    /// The requested model is not in the provider's catalog.
    #[must_use]
    pub fn unknown_model(model: &str) -> Self {
        Self::with_code(
            format!("Model '{model}' not found"),
            "invalid_request_error",
            "model_not_found",
        )
    }

    /// Concurrency cap reached; retry later.
    #[must_use]
    pub fn admission_rejected(max: usize) -> Self {
        Self::with_code(
            format!("Too many concurrent requests (limit {max}), please retry"),
            "rate_limit_error",
            "concurrency_limit",
        )
    }

    /// The gateway is shutting down.
    #[must_use]
    pub fn draining() -> Self {
        Self::with_code(
            "Gateway is shutting down",
            "service_unavailable",
            "draining",
        )
    }

    /// The per-request deadline passed.
    #[must_use]
    pub fn timeout() -> Self {
        Self::with_code(
            "Request exceeded the configured deadline",
            "timeout_error",
            "request_timeout",
        )
    }

    /// The provider failed or produced nothing usable.
    #[must_use]
    pub fn upstream_error(reason: &str) -> Self {
        Self::with_code(
            format!("Model provider request failed: {reason}"),
            "server_error",
            "upstream_error",
        )
    }

    /// The provider has no models to serve.
    #[must_use]
    pub fn no_models_available() -> Self {
        Self::with_code(
            "Model provider reports no available models",
            "server_error",
            "no_models_available",
        )
    }
}

impl From<&ProviderError> for ErrorResponse {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::NotAuthenticated(_) => Self::with_code(
                err.to_string(),
                "authentication_error",
                "provider_not_authenticated",
            ),
            ProviderError::Cancelled => {
                Self::with_code("Request was cancelled", "cancelled", "request_cancelled")
            }
            ProviderError::NotInstalled(_)
            | ProviderError::RequestFailed(_)
            | ProviderError::InvalidResponse(_) => Self::upstream_error(&err.to_string()),
        }
    }
}
