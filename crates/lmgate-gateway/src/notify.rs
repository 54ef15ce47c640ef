//! Status-change notifications.
//!
//! Subscribers get a payload-free "status changed, re-query" signal over a
//! broadcast channel, so a slow subscriber lags and drops signals instead
//! of stalling request processing. Per-request notifications are throttled
//! to a minimum interval with one trailing send, so a burst of completions
//! collapses into at most two signals; lifecycle transitions bypass the
//! throttle entirely.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
struct ThrottleState {
    min_interval: Duration,
    last_sent: Option<Instant>,
    trailing_armed: bool,
}

#[derive(Debug)]
struct NotifierInner {
    tx: broadcast::Sender<()>,
    throttle: Mutex<ThrottleState>,
}

impl NotifierInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleState> {
        self.throttle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self) {
        // Send fails only when there are no subscribers, which is fine.
        let _ = self.tx.send(());
    }
}

/// Subscription registry for status-change signals.
///
/// Clones share the same channel and throttle state.
#[derive(Debug, Clone)]
pub struct StatusNotifier {
    inner: Arc<NotifierInner>,
}

impl StatusNotifier {
    /// Create a notifier with the given minimum interval between
    /// throttled notifications.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(NotifierInner {
                tx,
                throttle: Mutex::new(ThrottleState {
                    min_interval,
                    last_sent: None,
                    trailing_armed: false,
                }),
            }),
        }
    }

    /// Adjust the throttle interval (adopted on restart with a new config).
    pub fn set_min_interval(&self, min_interval: Duration) {
        self.inner.lock().min_interval = min_interval;
    }

    /// Register a subscriber. Receivers that fall behind see a `Lagged`
    /// error and simply re-query; no signal carries state.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.tx.subscribe()
    }

    /// Signal a material status change, subject to the throttle.
    ///
    /// When called inside the minimum interval, one trailing signal is
    /// armed so the final state of a burst is always observed.
    pub fn notify(&self) {
        let now = Instant::now();
        let mut state = self.inner.lock();

        let due = state.min_interval.is_zero()
            || state
                .last_sent
                .is_none_or(|last| now.saturating_duration_since(last) >= state.min_interval);

        if due {
            state.last_sent = Some(now);
            drop(state);
            self.inner.send();
            return;
        }

        if state.trailing_armed {
            return;
        }
        state.trailing_armed = true;
        let elapsed = state
            .last_sent
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        let wait = state.min_interval.saturating_sub(elapsed);
        drop(state);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let mut state = inner.lock();
            state.trailing_armed = false;
            state.last_sent = Some(Instant::now());
            drop(state);
            inner.send();
        });
    }

    /// Signal immediately, ignoring the throttle. Used for lifecycle
    /// transitions, which must never be coalesced away.
    pub fn notify_now(&self) {
        let mut state = self.inner.lock();
        state.last_sent = Some(Instant::now());
        drop(state);
        self.inner.send();
    }

    /// Invoke `handler` on every signal from a dedicated task.
    ///
    /// The handler runs outside the gateway's locks; dropping the returned
    /// subscription stops the task.
    pub fn on_status_change<F>(&self, mut handler: F) -> StatusSubscription
    where
        F: FnMut() + Send + 'static,
    {
        let mut rx = self.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    // A lagged receiver missed some signals; the semantics
                    // are "re-query", so one invocation catches it up.
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => handler(),
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        StatusSubscription { handle }
    }
}

/// Handle for a registered status-change handler.
///
/// Dropping it deregisters the handler.
#[derive(Debug)]
pub struct StatusSubscription {
    handle: JoinHandle<()>,
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
