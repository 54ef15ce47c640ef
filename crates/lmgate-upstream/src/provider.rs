//! reqwest-backed `ModelProviderPort` against an OpenAI-compatible
//! upstream.
//!
//! The adapter keeps all transport concerns here: endpoint layout,
//! bearer-token auth, SSE framing, and the mapping from transport errors
//! to provider errors. The gateway never learns where completions
//! actually come from.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lmgate_core::{
    ChatMessage, ChatParams, FragmentStream, ModelDescriptor, ModelProviderPort,
    ProviderAvailability, ProviderError,
};

use crate::sse::SseDecoder;

/// Connection settings for the upstream endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL including the API prefix, e.g. `http://127.0.0.1:8080/v1`.
    pub base_url: String,
    /// Bearer token, when the upstream requires one.
    pub api_key: Option<String>,
    /// Connect timeout for upstream requests.
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            api_key: None,
            connect_timeout_ms: 5_000,
        }
    }
}

/// `ModelProviderPort` implementation over an OpenAI-compatible HTTP API.
#[derive(Debug)]
pub struct UpstreamProvider {
    client: Client,
    config: UpstreamConfig,
}

impl UpstreamProvider {
    /// Build the provider and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be constructed.
    pub fn new(config: UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn request_error(err: &reqwest::Error) -> ProviderError {
        if err.is_connect() || err.is_timeout() {
            ProviderError::NotInstalled(err.to_string())
        } else {
            ProviderError::RequestFailed(err.to_string())
        }
    }
}

#[async_trait]
impl ModelProviderPort for UpstreamProvider {
    async fn availability(&self) -> ProviderAvailability {
        let request = self.authorize(self.client.get(self.url("/models")));
        match request.send().await {
            Ok(response)
                if response.status() == StatusCode::UNAUTHORIZED
                    || response.status() == StatusCode::FORBIDDEN =>
            {
                ProviderAvailability::NotAuthenticated
            }
            // Anything else answering means something is listening there.
            Ok(_) => ProviderAvailability::Available,
            Err(e) => {
                debug!("availability probe failed: {e}");
                ProviderAvailability::NotInstalled
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        let request = self.authorize(self.client.get(self.url("/models")));
        let response = request
            .send()
            .await
            .map_err(|e| Self::request_error(&e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProviderError::NotAuthenticated(status.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::RequestFailed(format!(
                "model listing returned {status}"
            )));
        }

        let listing: UpstreamModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(listing
            .data
            .into_iter()
            .map(|entry| ModelDescriptor {
                display_name: entry.id.clone(),
                id: entry.id,
                family: entry.owned_by,
                context_length: None,
            })
            .collect())
    }

    async fn send_chat_request(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        params: &ChatParams,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, ProviderError> {
        let payload = UpstreamChatRequest {
            model: model.id.clone(),
            messages: messages
                .iter()
                .map(|m| UpstreamMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: true,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            stop: if params.stop.is_empty() {
                None
            } else {
                Some(params.stop.clone())
            },
        };

        let request = self.authorize(
            self.client
                .post(self.url("/chat/completions"))
                .json(&payload),
        );
        let response = request
            .send()
            .await
            .map_err(|e| Self::request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "upstream returned {status}: {detail}"
            )));
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("upstream chat request cancelled");
                        yield Err(ProviderError::Cancelled);
                        return;
                    }
                    chunk = bytes.next() => match chunk {
                        Some(Ok(buf)) => {
                            for payload in decoder.feed(&buf) {
                                if payload == "[DONE]" {
                                    return;
                                }
                                match extract_fragment(&payload) {
                                    Ok(Some(text)) => yield Ok(text),
                                    Ok(None) => {}
                                    Err(e) => {
                                        warn!("undecodable upstream chunk: {e}");
                                        yield Err(e);
                                        return;
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            yield Err(ProviderError::RequestFailed(e.to_string()));
                            return;
                        }
                        None => return,
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Pull the delta text out of one upstream chunk payload.
///
/// Role-only and keep-alive chunks decode to `None`.
fn extract_fragment(payload: &str) -> Result<Option<String>, ProviderError> {
    let chunk: UpstreamChunk = serde_json::from_str(payload)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad chunk: {e}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

// =============================================================================
// Upstream wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct UpstreamChatRequest {
    model: String,
    messages: Vec<UpstreamMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct UpstreamMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamModelList {
    #[serde(default)]
    data: Vec<UpstreamModelEntry>,
}

#[derive(Debug, Deserialize)]
struct UpstreamModelEntry {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    choices: Vec<UpstreamChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct UpstreamChunkChoice {
    delta: UpstreamDelta,
}

#[derive(Debug, Deserialize)]
struct UpstreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_doubled_slashes() {
        let provider = UpstreamProvider::new(UpstreamConfig {
            base_url: "http://localhost:9999/v1/".to_string(),
            ..UpstreamConfig::default()
        })
        .unwrap();
        assert_eq!(provider.url("/models"), "http://localhost:9999/v1/models");
    }

    #[test]
    fn extracts_content_fragments() {
        let payload = r#"{"choices":[{"delta":{"content":"hi"}}]}"#;
        assert_eq!(extract_fragment(payload).unwrap(), Some("hi".to_string()));
    }

    #[test]
    fn role_only_chunks_yield_nothing() {
        let payload = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(extract_fragment(payload).unwrap(), None);
    }

    #[test]
    fn malformed_chunks_are_invalid_responses() {
        assert!(matches!(
            extract_fragment("not json"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn chat_payload_omits_unset_sampling_params() {
        let request = UpstreamChatRequest {
            model: "m".to_string(),
            messages: vec![UpstreamMessage {
                role: "user",
                content: "hi".to_string(),
            }],
            stream: true,
            temperature: None,
            top_p: None,
            max_tokens: Some(64),
            stop: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["max_tokens"], 64);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
