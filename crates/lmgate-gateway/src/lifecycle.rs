//! Gateway lifecycle controller.
//!
//! The `Gateway` owns its run state internally; callers (CLI, UI shells,
//! URI handlers) go through `start`/`stop`/`restart`/`status` and never
//! touch the listener or the serve task themselves.
//!
//! Key design decisions:
//! - **Readiness before sockets**: the provider gate runs first; a gateway
//!   that cannot serve never binds a port
//! - **Bind-then-report**: the TcpListener binds before the task spawns,
//!   so `start` returns the real address
//! - **Crash detection**: `status()` uses the cancellation token to
//!   distinguish clean stop from an unexpected task exit
//! - **Split locks**: an async operation lock serializes start/stop while
//!   a cheap sync lock backs `status()`, so a status query never waits on
//!   network I/O happening inside `start`

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result as AnyResult;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lmgate_core::{ConfigError, GatewayStatus, ModelProviderPort, ServerConfig};

use crate::admission::AdmissionController;
use crate::metrics::MetricsAggregator;
use crate::notify::{StatusNotifier, StatusSubscription};
use crate::readiness::{NotReadyReason, ReadinessGate};
use crate::server::{self, AppState};

/// Extra time after a forced cancellation before the task is abandoned.
const FORCE_CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Error from lifecycle operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Running with a different config; callers must restart explicitly.
    #[error("gateway is already running on {0} with a different configuration")]
    AlreadyRunning(SocketAddr),

    /// The provider readiness gate failed; nothing was bound.
    #[error("model provider is not ready: {0}")]
    NotReady(NotReadyReason),

    /// The listener could not bind (e.g., port in use).
    #[error("failed to bind {address}: {reason}")]
    BindFailed {
        /// Address that was attempted.
        address: String,
        /// OS-level reason.
        reason: String,
    },

    /// `restart` without a config on a gateway that never started.
    #[error("gateway has never been started; no configuration to reuse")]
    NoPreviousConfig,

    /// Internal error.
    #[error("internal gateway error: {0}")]
    Internal(String),
}

/// Handle to a running gateway server.
struct RunHandle {
    /// Config this run was started with.
    config: ServerConfig,
    /// Address the listener is bound to.
    bound_addr: SocketAddr,
    /// Cancellation token for graceful shutdown.
    cancel: CancellationToken,
    /// Concurrency coordinator of this run.
    admission: Arc<AdmissionController>,
    /// Join handle for the serve task (returns Result for error propagation).
    join: JoinHandle<AnyResult<()>>,
    /// Wall-clock start time.
    started_at: DateTime<Utc>,
}

/// Lifecycle controller for the gateway.
///
/// Construct one per provider and share it behind an `Arc`; there is no
/// ambient global instance.
pub struct Gateway {
    provider: Arc<dyn ModelProviderPort>,
    metrics: Arc<MetricsAggregator>,
    notifier: StatusNotifier,
    /// Serializes start/stop/restart so transitions never interleave.
    op: tokio::sync::Mutex<()>,
    /// Current run, readable without awaiting.
    run: Mutex<Option<RunHandle>>,
    /// Config of the most recent successful start.
    last_config: Mutex<Option<ServerConfig>>,
}

impl Gateway {
    /// Create a stopped gateway for the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProviderPort>) -> Self {
        Self::with_metrics(provider, MetricsAggregator::default())
    }

    /// Create a stopped gateway with a custom metrics window.
    #[must_use]
    pub fn with_metrics(provider: Arc<dyn ModelProviderPort>, metrics: MetricsAggregator) -> Self {
        Self {
            provider,
            metrics: Arc::new(metrics),
            notifier: StatusNotifier::new(Duration::from_millis(
                lmgate_core::config::DEFAULT_NOTIFY_MIN_INTERVAL_MS,
            )),
            op: tokio::sync::Mutex::new(()),
            run: Mutex::new(None),
            last_config: Mutex::new(None),
        }
    }

    /// Start serving with the given config.
    ///
    /// Idempotent when already running with an identical config (returns
    /// the bound address, binds nothing new).
    ///
    /// # Errors
    ///
    /// `Config` on validation failure, `AlreadyRunning` on a conflicting
    /// config, `NotReady` when the provider gate fails (no socket bound),
    /// `BindFailed` when the listener cannot bind.
    pub async fn start(&self, config: ServerConfig) -> Result<SocketAddr, GatewayError> {
        let _op = self.op.lock().await;
        self.start_inner(config).await
    }

    /// Stop serving. No-op when already stopped.
    ///
    /// Drains in-flight requests up to the config's drain deadline, then
    /// force-cancels the stragglers.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the serve task errored, panicked, or had to
    /// be aborted; the gateway still ends up stopped.
    pub async fn stop(&self) -> Result<(), GatewayError> {
        let _op = self.op.lock().await;
        self.stop_inner().await
    }

    /// Stop then start as one operation.
    ///
    /// `config` of `None` reuses the last config. If the stop fails the
    /// start is not attempted.
    ///
    /// # Errors
    ///
    /// `NoPreviousConfig` when there is nothing to reuse, otherwise any
    /// `stop`/`start` error.
    pub async fn restart(
        &self,
        config: Option<ServerConfig>,
    ) -> Result<SocketAddr, GatewayError> {
        let _op = self.op.lock().await;
        let target = match config {
            Some(config) => config,
            None => self
                .lock_last_config()
                .clone()
                .ok_or(GatewayError::NoPreviousConfig)?,
        };
        self.stop_inner().await?;
        self.start_inner(target).await
    }

    /// Snapshot the externally visible state.
    ///
    /// Synchronous by design: never blocks on network I/O and never waits
    /// behind an in-progress start/stop.
    pub fn status(&self) -> GatewayStatus {
        let stats = self.metrics.snapshot();
        let mut guard = self.lock_run();

        // A task that finished without stop() is either a clean external
        // cancellation or a crash; either way the handle is stale.
        let finished = guard
            .as_ref()
            .is_some_and(|handle| handle.join.is_finished());
        if finished {
            let was_cancelled = guard
                .as_ref()
                .is_some_and(|handle| handle.cancel.is_cancelled());
            if !was_cancelled {
                warn!("gateway task ended unexpectedly; clearing handle");
            }
            *guard = None;
        }

        let running = guard.as_ref().map(|handle| GatewayStatus {
            running: true,
            address: Some(handle.bound_addr),
            config: Some(handle.config.clone()),
            active_requests: handle.admission.active(),
            stats,
            started_at: Some(handle.started_at),
        });
        drop(guard);

        running.unwrap_or_else(|| GatewayStatus::stopped(self.lock_last_config().clone(), stats))
    }

    /// Register for payload-free status-change signals.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notifier.subscribe()
    }

    /// Invoke `handler` from a dedicated task on every status change.
    /// Dropping the returned subscription deregisters it.
    pub fn on_status_change<F>(&self, handler: F) -> StatusSubscription
    where
        F: FnMut() + Send + 'static,
    {
        self.notifier.on_status_change(handler)
    }

    async fn start_inner(&self, config: ServerConfig) -> Result<SocketAddr, GatewayError> {
        // Inspect existing state first so an identical start stays cheap.
        let stale = {
            let mut guard = self.lock_run();
            match guard.take() {
                Some(handle) if !handle.join.is_finished() => {
                    let addr = handle.bound_addr;
                    let same = handle.config == config;
                    *guard = Some(handle);
                    if same {
                        debug!("gateway already running with identical config");
                        return Ok(addr);
                    }
                    return Err(GatewayError::AlreadyRunning(addr));
                }
                other => other,
            }
        };
        if let Some(old) = stale {
            if !old.cancel.is_cancelled() {
                warn!("previous gateway task ended unexpectedly");
            }
            match old.join.await {
                Ok(Ok(())) => debug!("previous gateway task completed"),
                Ok(Err(e)) => warn!("previous gateway task ended with error: {e}"),
                Err(e) => warn!("previous gateway task panicked: {e}"),
            }
        }

        config.validate()?;

        // Readiness first: a gateway that cannot serve never binds a port.
        let gate = ReadinessGate::new(Arc::clone(&self.provider));
        gate.check_ready().await.map_err(GatewayError::NotReady)?;

        // Bind FIRST - report the real address, not the requested one.
        let bind_addr = config.bind_addr();
        let listener =
            TcpListener::bind(&bind_addr)
                .await
                .map_err(|e| GatewayError::BindFailed {
                    address: bind_addr.clone(),
                    reason: e.to_string(),
                })?;
        let bound_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Internal(format!("failed to get local address: {e}")))?;

        info!("gateway bound to {bound_addr}");

        self.notifier
            .set_min_interval(Duration::from_millis(config.notify_min_interval_ms));
        // A fresh run starts with a clean window; the monotonic total
        // survives restarts.
        self.metrics.reset_window();

        let cancel = CancellationToken::new();
        let admission = Arc::new(AdmissionController::new(
            config.max_concurrent_requests,
            Arc::clone(&self.metrics),
            self.notifier.clone(),
        ));
        let state = AppState::new(
            Arc::clone(&self.provider),
            Arc::clone(&admission),
            Arc::clone(&self.metrics),
            Duration::from_millis(config.request_timeout_ms),
        );

        let cancel_clone = cancel.clone();
        let join: JoinHandle<AnyResult<()>> = tokio::spawn(async move {
            debug!(addr = %bound_addr, "gateway task starting");
            server::serve(listener, state, cancel_clone).await
        });

        *self.lock_run() = Some(RunHandle {
            config: config.clone(),
            bound_addr,
            cancel,
            admission,
            join,
            started_at: Utc::now(),
        });
        *self.lock_last_config() = Some(config);
        self.notifier.notify_now();

        Ok(bound_addr)
    }

    async fn stop_inner(&self) -> Result<(), GatewayError> {
        let Some(handle) = self.lock_run().take() else {
            debug!("gateway already stopped");
            return Ok(());
        };

        info!("stopping gateway on {}", handle.bound_addr);

        // New requests are rejected from here on; the accept loop closes
        // and in-flight requests get until the drain deadline to finish.
        handle.admission.begin_drain();
        handle.cancel.cancel();

        let drain = Duration::from_millis(handle.config.drain_timeout_ms);
        let mut join = handle.join;

        let result = match tokio::time::timeout(drain, &mut join).await {
            Ok(joined) => Self::interpret_join(joined),
            Err(_) => {
                warn!(
                    in_flight = handle.admission.active(),
                    "drain deadline exceeded; cancelling in-flight requests"
                );
                handle.admission.cancel_inflight();
                match tokio::time::timeout(FORCE_CANCEL_GRACE, &mut join).await {
                    Ok(joined) => Self::interpret_join(joined),
                    Err(_) => {
                        warn!("gateway task did not stop after forced cancellation; aborting");
                        join.abort();
                        Err(GatewayError::Internal(
                            "gateway stop timed out; task aborted".into(),
                        ))
                    }
                }
            }
        };

        self.notifier.notify_now();
        result
    }

    fn interpret_join(joined: Result<AnyResult<()>, tokio::task::JoinError>) -> Result<(), GatewayError> {
        match joined {
            Ok(Ok(())) => {
                info!("gateway stopped cleanly");
                Ok(())
            }
            Ok(Err(e)) => Err(GatewayError::Internal(format!("gateway task error: {e}"))),
            Err(join_err) => Err(GatewayError::Internal(format!(
                "gateway task panicked: {join_err}"
            ))),
        }
    }

    fn lock_run(&self) -> std::sync::MutexGuard<'_, Option<RunHandle>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_last_config(&self) -> std::sync::MutexGuard<'_, Option<ServerConfig>> {
        self.last_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use lmgate_core::{
        ChatMessage, ChatParams, FragmentStream, ModelDescriptor, ProviderAvailability,
        ProviderError,
    };

    /// Scripted provider for lifecycle tests.
    #[derive(Debug)]
    struct MockProvider {
        availability: ProviderAvailability,
    }

    impl MockProvider {
        fn ready() -> Arc<dyn ModelProviderPort> {
            Arc::new(Self {
                availability: ProviderAvailability::Available,
            })
        }
    }

    #[async_trait]
    impl ModelProviderPort for MockProvider {
        async fn availability(&self) -> ProviderAvailability {
            self.availability
        }

        async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
            Ok(vec![ModelDescriptor::named("mock-model")])
        }

        async fn send_chat_request(
            &self,
            _model: &ModelDescriptor,
            _messages: &[ChatMessage],
            _params: &ChatParams,
            _cancel: CancellationToken,
        ) -> Result<FragmentStream, ProviderError> {
            Ok(futures_util::stream::iter(vec![Ok("ok".to_string())]).boxed())
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0, // Random port
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn gateway_lifecycle_settles_in_running_or_stopped() {
        let gateway = Gateway::new(MockProvider::ready());

        // Initially stopped
        assert!(!gateway.status().running);

        // Start on random port
        let config = test_config();
        let addr = gateway.start(config.clone()).await.unwrap();
        assert_ne!(addr.port(), 0);

        let status = gateway.status();
        assert!(status.running);
        assert_eq!(status.address, Some(addr));
        assert_eq!(status.active_requests, 0);

        // Same config again: idempotent no-op returning the same address
        let again = gateway.start(config).await.unwrap();
        assert_eq!(again, addr);
        assert!(gateway.status().running);

        // Different config while running: explicit conflict
        let conflicting = ServerConfig {
            max_concurrent_requests: 99,
            ..test_config()
        };
        assert!(matches!(
            gateway.start(conflicting).await,
            Err(GatewayError::AlreadyRunning(running)) if running == addr
        ));

        // Stop
        gateway.stop().await.unwrap();
        assert!(!gateway.status().running);

        // Stopping again is a no-op
        gateway.stop().await.unwrap();
    }

    #[tokio::test]
    async fn readiness_failure_binds_nothing() {
        let gateway = Gateway::new(Arc::new(MockProvider {
            availability: ProviderAvailability::NotAuthenticated,
        }));

        let err = gateway.start(test_config()).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::NotReady(NotReadyReason::NotAuthenticated)
        ));
        assert!(!gateway.status().running);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let gateway = Gateway::new(MockProvider::ready());
        let config = ServerConfig {
            max_concurrent_requests: 0,
            ..test_config()
        };
        assert!(matches!(
            gateway.start(config).await,
            Err(GatewayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn occupied_port_yields_bind_failed() {
        let occupant = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupant.local_addr().unwrap().port();

        let gateway = Gateway::new(MockProvider::ready());
        let config = ServerConfig {
            port,
            ..ServerConfig::default()
        };

        assert!(matches!(
            gateway.start(config).await,
            Err(GatewayError::BindFailed { .. })
        ));
        assert!(!gateway.status().running);
    }

    #[tokio::test]
    async fn restart_reuses_or_adopts_config() {
        let gateway = Gateway::new(MockProvider::ready());

        // Restart before any start has nothing to reuse
        assert!(matches!(
            gateway.restart(None).await,
            Err(GatewayError::NoPreviousConfig)
        ));

        gateway.start(test_config()).await.unwrap();

        // Restart with a new config adopts it
        let new_config = ServerConfig {
            max_concurrent_requests: 3,
            ..test_config()
        };
        gateway.restart(Some(new_config.clone())).await.unwrap();
        let status = gateway.status();
        assert!(status.running);
        assert_eq!(
            status.config.map(|c| c.max_concurrent_requests),
            Some(3)
        );

        // Restart with None reuses the last config
        gateway.restart(None).await.unwrap();
        assert_eq!(
            gateway.status().config.map(|c| c.max_concurrent_requests),
            Some(3)
        );

        gateway.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_transitions_notify_subscribers() {
        let gateway = Gateway::new(MockProvider::ready());
        let mut rx = gateway.subscribe();

        gateway.start(test_config()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("start should notify")
            .unwrap();

        gateway.stop().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("stop should notify")
            .unwrap();
    }
}
