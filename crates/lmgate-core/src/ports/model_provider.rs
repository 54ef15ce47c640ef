//! Model provider port.
//!
//! The provider is the capability the gateway relays to: something able to
//! enumerate chat models and execute a chat request as a stream of text
//! fragments. The gateway's lifecycle, dispatch, and metrics logic only
//! ever sees this trait, which keeps it host-agnostic and testable with a
//! scripted fake.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::{ChatMessage, ChatParams, ModelDescriptor};

/// Stream of incremental text fragments from a chat request.
///
/// Fragments arrive in generation order; the stream ends when the provider
/// finishes or yields a terminal error.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

/// Coarse availability of the provider capability, checked before the
/// gateway starts serving traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAvailability {
    /// Installed, reachable, and authenticated.
    Available,
    /// The capability is missing or unreachable.
    NotInstalled,
    /// Reachable but the credentials were rejected.
    NotAuthenticated,
}

/// Errors from provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider is missing or unreachable.
    #[error("model provider is not reachable: {0}")]
    NotInstalled(String),

    /// The provider rejected the credentials.
    #[error("model provider rejected the credentials: {0}")]
    NotAuthenticated(String),

    /// The provider accepted the request but failed to serve it.
    #[error("provider request failed: {0}")]
    RequestFailed(String),

    /// The provider responded with something the adapter cannot decode.
    #[error("provider returned an unusable response: {0}")]
    InvalidResponse(String),

    /// The request was cancelled before the provider finished.
    #[error("request was cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Suggested HTTP status code when this error is surfaced to a caller.
    #[must_use]
    pub const fn suggested_status_code(&self) -> u16 {
        match self {
            Self::NotInstalled(_) | Self::RequestFailed(_) | Self::InvalidResponse(_) => 502,
            Self::NotAuthenticated(_) => 401,
            Self::Cancelled => 499,
        }
    }
}

/// Port for the externally supplied chat-model capability.
#[async_trait]
pub trait ModelProviderPort: Send + Sync + fmt::Debug {
    /// Probe whether the capability is usable at all.
    ///
    /// Side-effect-free; consulted by the readiness gate before the
    /// gateway binds its listener.
    async fn availability(&self) -> ProviderAvailability;

    /// List the models currently available from the provider.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the provider cannot be queried.
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError>;

    /// Execute a chat request, streaming the response incrementally.
    ///
    /// Cancelling `cancel` must make the stream end promptly; adapters
    /// abort the underlying call rather than draining it.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the request cannot be started. Failures
    /// after the first fragment surface as `Err` items in the stream.
    async fn send_chat_request(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        params: &ChatParams,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    /// Minimal in-memory provider proving the port is object-safe and
    /// usable behind `Arc<dyn ...>`.
    #[derive(Debug)]
    struct EchoProvider;

    #[async_trait]
    impl ModelProviderPort for EchoProvider {
        async fn availability(&self) -> ProviderAvailability {
            ProviderAvailability::Available
        }

        async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
            Ok(vec![ModelDescriptor::named("echo")])
        }

        async fn send_chat_request(
            &self,
            _model: &ModelDescriptor,
            messages: &[ChatMessage],
            _params: &ChatParams,
            _cancel: CancellationToken,
        ) -> Result<FragmentStream, ProviderError> {
            let last = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(futures_util::stream::iter(vec![Ok(last)]).boxed())
        }
    }

    #[tokio::test]
    async fn port_is_usable_as_trait_object() {
        let provider: std::sync::Arc<dyn ModelProviderPort> = std::sync::Arc::new(EchoProvider);
        assert_eq!(provider.availability().await, ProviderAvailability::Available);

        let models = provider.list_models().await.unwrap();
        let stream = provider
            .send_chat_request(
                &models[0],
                &[ChatMessage::user("ping")],
                &ChatParams::default(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let fragments: Vec<_> = stream.collect().await;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), "ping");
    }

    #[test]
    fn suggested_status_codes() {
        assert_eq!(
            ProviderError::NotAuthenticated("401".into()).suggested_status_code(),
            401
        );
        assert_eq!(
            ProviderError::RequestFailed("boom".into()).suggested_status_code(),
            502
        );
    }
}
