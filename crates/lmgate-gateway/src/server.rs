//! Axum HTTP server for the OpenAI-compatible gateway.
//!
//! This module provides the `serve()` function that runs the dispatcher
//! using a pre-bound TcpListener (from the lifecycle controller), plus the
//! handlers that translate between the wire format and the provider port.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use lmgate_core::{
    FragmentStream, ModelDescriptor, ModelProviderPort, ModelSelector, ProviderError,
};

use crate::admission::{self, AdmissionController, AdmissionError, AdmissionToken};
use crate::api::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ErrorResponse,
    ModelsResponse, completion_id,
};
use crate::metrics::{MetricsAggregator, RequestOutcome};

/// Shared application state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    /// Port the requests are relayed to.
    provider: Arc<dyn ModelProviderPort>,
    /// Concurrency coordinator for this run.
    admission: Arc<AdmissionController>,
    /// Rolling metrics behind the status surface.
    metrics: Arc<MetricsAggregator>,
    /// Per-request deadline.
    request_timeout: Duration,
}

impl AppState {
    /// Assemble the state for one gateway run.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ModelProviderPort>,
        admission: Arc<AdmissionController>,
        metrics: Arc<MetricsAggregator>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            admission,
            metrics,
            request_timeout,
        }
    }
}

/// Run the gateway server on a pre-bound listener until the cancellation
/// token fires, then finish in-flight connections and return.
///
/// # Errors
///
/// Returns an error if the server fails while serving.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("gateway serving on {addr}");

    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("gateway server shut down");
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}

/// Lightweight status endpoint.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.metrics.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "activeRequests": state.admission.active(),
        "totalRequests": stats.total_requests,
    }))
}

/// List provider models in OpenAI format.
async fn list_models(State(state): State<AppState>) -> Response {
    debug!("GET /v1/models");

    match state.provider.list_models().await {
        Ok(models) => Json(ModelsResponse::from_descriptors(models)).into_response(),
        Err(e) => {
            error!("failed to list models: {e}");
            provider_error_response(&e)
        }
    }
}

/// Handle chat completions - admit, translate, relay, record.
async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    debug!("POST /v1/chat/completions");

    // Parse the wire request before spending an admission slot on it.
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            error!("failed to parse request: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::invalid_request(format!(
                    "Invalid request body: {e}"
                ))),
            )
                .into_response();
        }
    };

    let (selector, messages, params) = match request.to_domain() {
        Ok(parts) => parts,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::invalid_request(e.to_string())),
            )
                .into_response();
        }
    };

    let token = match state.admission.try_admit() {
        Ok(token) => token,
        Err(AdmissionError::LimitReached { max }) => {
            debug!("admission rejected: {max} requests in flight");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse::admission_rejected(max)),
            )
                .into_response();
            if let Ok(value) = "1".parse::<HeaderValue>() {
                response.headers_mut().insert("retry-after", value);
            }
            return response;
        }
        Err(AdmissionError::Draining) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::draining()),
            )
                .into_response();
        }
    };

    // Resolve the target model before any provider call.
    let model = match resolve_model(&state, &selector).await {
        Ok(model) => model,
        Err(response) => {
            token.complete(RequestOutcome::Error);
            return response;
        }
    };

    info!(
        model = %model.id,
        streaming = %request.stream,
        "processing chat completion request"
    );

    admission::arm_timeout(&token, state.request_timeout);
    let cancel = token.cancellation();

    let fragments = match state
        .provider
        .send_chat_request(&model, &messages, &params, cancel.clone())
        .await
    {
        Ok(stream) => stream,
        Err(ProviderError::Cancelled) => {
            token.complete(RequestOutcome::Cancelled);
            return (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse::timeout())).into_response();
        }
        Err(e) => {
            error!("provider call failed: {e}");
            let response = provider_error_response(&e);
            token.complete(RequestOutcome::Error);
            return response;
        }
    };

    if request.stream {
        stream_response(token, cancel, fragments, model.id)
    } else {
        buffered_response(token, cancel, fragments, &model.id).await
    }
}

/// Pick the target model: an explicit id must exist in the catalog, auto
/// takes the first available model, and an empty catalog fails upstream
/// before any provider call.
async fn resolve_model(
    state: &AppState,
    selector: &ModelSelector,
) -> Result<ModelDescriptor, Response> {
    let models = match state.provider.list_models().await {
        Ok(models) => models,
        Err(e) => {
            error!("failed to resolve models: {e}");
            return Err(provider_error_response(&e));
        }
    };

    if models.is_empty() {
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::no_models_available()),
        )
            .into_response());
    }

    match selector {
        ModelSelector::Named(name) => models
            .into_iter()
            .find(|m| m.id.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                (StatusCode::NOT_FOUND, Json(ErrorResponse::unknown_model(name))).into_response()
            }),
        ModelSelector::Auto => models.into_iter().next().ok_or_else(|| {
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::no_models_available()),
            )
                .into_response()
        }),
    }
}

/// Aggregate the fragment stream into one JSON completion.
async fn buffered_response(
    token: AdmissionToken,
    cancel: CancellationToken,
    mut fragments: FragmentStream,
    model_id: &str,
) -> Response {
    let mut content = String::new();
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("request cancelled before completion");
                token.complete(RequestOutcome::Cancelled);
                return (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse::timeout())).into_response();
            }
            next = fragments.next() => match next {
                Some(Ok(text)) => content.push_str(&text),
                Some(Err(ProviderError::Cancelled)) => {
                    token.complete(RequestOutcome::Cancelled);
                    return (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse::timeout())).into_response();
                }
                Some(Err(e)) => {
                    error!("provider stream failed: {e}");
                    let response = provider_error_response(&e);
                    token.complete(RequestOutcome::Error);
                    return response;
                }
                None => break,
            }
        }
    }

    token.complete(RequestOutcome::Success);
    Json(ChatCompletionResponse::assistant(model_id, content)).into_response()
}

/// Relay the fragment stream as SSE chunks, no buffering.
///
/// The admission token lives inside the stream: when the client
/// disconnects mid-stream the body is dropped, the token drops with it,
/// and the request is recorded as cancelled.
fn stream_response(
    token: AdmissionToken,
    cancel: CancellationToken,
    mut fragments: FragmentStream,
    model_id: String,
) -> Response {
    let id = completion_id();
    let created = chrono::Utc::now().timestamp();

    let sse = async_stream::stream! {
        let mut token = Some(token);
        yield Ok::<_, Infallible>(sse_event(&ChatCompletionChunk::role_opening(
            &id, &model_id, created,
        )));

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("stream cancelled mid-flight");
                    if let Some(token) = token.take() {
                        token.complete(RequestOutcome::Cancelled);
                    }
                    return;
                }
                next = fragments.next() => match next {
                    Some(Ok(text)) => {
                        yield Ok(sse_event(&ChatCompletionChunk::content(
                            &id, &model_id, created, text,
                        )));
                    }
                    Some(Err(e)) => {
                        error!("provider stream failed: {e}");
                        let outcome = if matches!(e, ProviderError::Cancelled) {
                            RequestOutcome::Cancelled
                        } else {
                            RequestOutcome::Error
                        };
                        if let Some(token) = token.take() {
                            token.complete(outcome);
                        }
                        return;
                    }
                    None => break,
                }
            }
        }

        yield Ok(sse_event(&ChatCompletionChunk::finish(&id, &model_id, created)));
        yield Ok(Bytes::from_static(b"data: [DONE]\n\n"));
        if let Some(token) = token.take() {
            token.complete(RequestOutcome::Success);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("x-accel-buffering", "no") // Disable nginx buffering
        .body(Body::from_stream(sse))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Encode one payload as an SSE `data:` event.
fn sse_event<T: Serialize>(payload: &T) -> Bytes {
    match serde_json::to_string(payload) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(e) => {
            error!("failed to encode stream chunk: {e}");
            Bytes::from_static(b": encode-error\n\n")
        }
    }
}

/// Convert a provider error to an HTTP response with a matching status.
fn provider_error_response(err: &ProviderError) -> Response {
    let status =
        StatusCode::from_u16(err.suggested_status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(ErrorResponse::from(err))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::StatusNotifier;
    use async_trait::async_trait;
    use lmgate_core::{ChatMessage, ChatParams, ProviderAvailability};

    #[derive(Debug)]
    struct NullProvider;

    #[async_trait]
    impl ModelProviderPort for NullProvider {
        async fn availability(&self) -> ProviderAvailability {
            ProviderAvailability::Available
        }

        async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
            Ok(vec![])
        }

        async fn send_chat_request(
            &self,
            _model: &ModelDescriptor,
            _messages: &[ChatMessage],
            _params: &ChatParams,
            _cancel: CancellationToken,
        ) -> Result<FragmentStream, ProviderError> {
            Err(ProviderError::RequestFailed("no backing model".into()))
        }
    }

    fn test_state() -> AppState {
        let metrics = Arc::new(MetricsAggregator::default());
        let notifier = StatusNotifier::new(Duration::ZERO);
        let admission = Arc::new(AdmissionController::new(2, Arc::clone(&metrics), notifier));
        AppState::new(
            Arc::new(NullProvider),
            admission,
            metrics,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn health_reports_ok_with_counters() {
        let response = health(State(test_state())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let response =
            chat_completions(State(test_state()), Bytes::from_static(b"not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_catalog_fails_before_the_provider_call() {
        let body = Bytes::from_static(br#"{"messages":[{"role":"user","content":"hi"}]}"#);
        let state = test_state();
        let response = chat_completions(State(state.clone()), body).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        // The admitted-then-failed request shows up in the totals.
        assert_eq!(state.metrics.snapshot().total_requests, 1);
        assert_eq!(state.admission.active(), 0);
    }
}
