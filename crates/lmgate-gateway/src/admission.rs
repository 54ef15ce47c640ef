//! Request admission and in-flight coordination.
//!
//! Every request passes through the `AdmissionController` before any
//! provider work happens. Admission enforces the concurrency cap, stamps
//! the start instant, and hands out a token whose completion (or drop)
//! is the single place where `active_requests` decrements and metrics get
//! recorded. A token that is dropped without an explicit outcome records
//! `Cancelled` - that is exactly what a client disconnect looks like.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::{MetricsAggregator, RequestOutcome};
use crate::notify::StatusNotifier;

/// Why a request was not admitted. Backpressure, not a fault.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// The concurrency cap is reached; the caller should retry later.
    #[error("concurrency limit reached ({max} requests in flight)")]
    LimitReached {
        /// The configured cap.
        max: usize,
    },

    /// The gateway is shutting down and admits nothing new.
    #[error("gateway is draining and not accepting new requests")]
    Draining,
}

#[derive(Debug)]
struct AdmissionState {
    active: usize,
    draining: bool,
}

/// State shared between the controller and its outstanding tokens.
#[derive(Debug)]
struct AdmissionShared {
    max_concurrent: usize,
    state: Mutex<AdmissionState>,
    /// Parent of every per-request token; cancelled to force-drain.
    drain_root: CancellationToken,
    metrics: Arc<MetricsAggregator>,
    notifier: StatusNotifier,
}

impl AdmissionShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, AdmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, outcome: RequestOutcome, started_at: Instant, latency: Option<Duration>) {
        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
        }
        self.metrics.record(outcome, started_at, latency);
        self.notifier.notify();
    }
}

/// Tracks in-flight requests for one gateway run.
#[derive(Debug)]
pub struct AdmissionController {
    shared: Arc<AdmissionShared>,
}

impl AdmissionController {
    /// Create a controller for a run with the given concurrency cap.
    #[must_use]
    pub fn new(
        max_concurrent: usize,
        metrics: Arc<MetricsAggregator>,
        notifier: StatusNotifier,
    ) -> Self {
        Self {
            shared: Arc::new(AdmissionShared {
                max_concurrent,
                state: Mutex::new(AdmissionState {
                    active: 0,
                    draining: false,
                }),
                drain_root: CancellationToken::new(),
                metrics,
                notifier,
            }),
        }
    }

    /// Try to admit a request.
    ///
    /// # Errors
    ///
    /// `LimitReached` at the concurrency cap, `Draining` once shutdown has
    /// begun. Neither increments any counter.
    pub fn try_admit(&self) -> Result<AdmissionToken, AdmissionError> {
        {
            let mut state = self.shared.lock();
            if state.draining {
                return Err(AdmissionError::Draining);
            }
            if state.active >= self.shared.max_concurrent {
                return Err(AdmissionError::LimitReached {
                    max: self.shared.max_concurrent,
                });
            }
            state.active += 1;
        }
        self.shared.notifier.notify();
        Ok(AdmissionToken {
            shared: Arc::clone(&self.shared),
            started_at: Instant::now(),
            cancel: self.shared.drain_root.child_token(),
            finished: false,
        })
    }

    /// Requests currently admitted but not finished.
    #[must_use]
    pub fn active(&self) -> usize {
        self.shared.lock().active
    }

    /// Stop admitting new requests. Existing tokens stay tracked until
    /// they complete or are force-cancelled.
    pub fn begin_drain(&self) {
        self.shared.lock().draining = true;
    }

    /// Cancel every in-flight request (drain deadline exceeded).
    pub fn cancel_inflight(&self) {
        self.shared.drain_root.cancel();
    }
}

/// Proof of admission for one request.
///
/// Completing the token records the outcome; dropping it unfinished
/// records `Cancelled`. Either way the active count decrements exactly
/// once.
#[derive(Debug)]
pub struct AdmissionToken {
    shared: Arc<AdmissionShared>,
    started_at: Instant,
    cancel: CancellationToken,
    finished: bool,
}

impl AdmissionToken {
    /// Cancellation token for this request. Child of the run's drain
    /// root, so a forced drain cancels it too.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// When the request was admitted.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Record the final outcome. Latency is measured here for completed
    /// outcomes; cancellations carry no latency sample.
    pub fn complete(mut self, outcome: RequestOutcome) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: RequestOutcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        // Release any armed timeout timer and abort provider work that is
        // still pending for this request.
        self.cancel.cancel();
        let latency = match outcome {
            RequestOutcome::Cancelled => None,
            RequestOutcome::Success | RequestOutcome::Error => Some(self.started_at.elapsed()),
        };
        self.shared.release(outcome, self.started_at, latency);
    }
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        if !self.finished {
            debug!("admission token dropped without completion; recording cancellation");
            self.finish(RequestOutcome::Cancelled);
        }
    }
}

/// Arm the per-request deadline: when it passes before the request
/// completes, the request's cancellation token fires and the outcome is
/// recorded as cancelled.
pub fn arm_timeout(token: &AdmissionToken, timeout: Duration) {
    let cancel = token.cancellation();
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(timeout) => {
                debug!("request deadline exceeded, cancelling");
                cancel.cancel();
            }
        }
    });
}
