//! Provider readiness gate.
//!
//! Consulted exactly once per `start`, before any socket is bound. The
//! check is side-effect-free and its failure reasons are surfaced
//! verbatim so a caller can present an actionable message ("sign in",
//! "install the provider") instead of a generic failure.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use lmgate_core::{ModelProviderPort, ProviderAvailability, ProviderError};

/// Why the gateway refused to start serving.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The provider capability is missing or unreachable.
    #[error("the model provider is not installed or not reachable")]
    NotInstalled,

    /// The provider is reachable but not authenticated.
    #[error("the model provider is not authenticated")]
    NotAuthenticated,

    /// The provider reports an empty model catalog.
    #[error("the model provider has no models available")]
    NoModelsAvailable,
}

/// Readiness check over the provider port.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    provider: Arc<dyn ModelProviderPort>,
}

impl ReadinessGate {
    /// Gate for the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProviderPort>) -> Self {
        Self { provider }
    }

    /// Confirm the provider is installed, authenticated, and has at least
    /// one model to serve.
    ///
    /// # Errors
    ///
    /// Returns the first `NotReadyReason` encountered.
    pub async fn check_ready(&self) -> Result<(), NotReadyReason> {
        match self.provider.availability().await {
            ProviderAvailability::Available => {}
            ProviderAvailability::NotInstalled => return Err(NotReadyReason::NotInstalled),
            ProviderAvailability::NotAuthenticated => return Err(NotReadyReason::NotAuthenticated),
        }

        match self.provider.list_models().await {
            Ok(models) if !models.is_empty() => Ok(()),
            Ok(_) => Err(NotReadyReason::NoModelsAvailable),
            Err(ProviderError::NotAuthenticated(_)) => Err(NotReadyReason::NotAuthenticated),
            Err(ProviderError::NotInstalled(_)) => Err(NotReadyReason::NotInstalled),
            Err(e) => {
                debug!("model listing failed during readiness check: {e}");
                Err(NotReadyReason::NoModelsAvailable)
            }
        }
    }
}
