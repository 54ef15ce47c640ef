//! Rolling-window metrics aggregation.
//!
//! The aggregator keeps a bounded, time-ordered window of request records
//! plus one monotonic total. Eviction runs lazily on record/snapshot, so
//! there is no background timer to manage. All arithmetic is defined on an
//! empty window (zeros, never NaN).

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use lmgate_core::Stats;

/// Default trailing window for throughput and error-rate metrics.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Final outcome of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The response was fully delivered.
    Success,
    /// The provider call or the translation failed.
    Error,
    /// The caller disconnected, the deadline hit, or a drain cut it off.
    Cancelled,
}

impl RequestOutcome {
    /// Whether this outcome counts toward the error rate.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    started_at: Instant,
    latency: Option<Duration>,
    outcome: RequestOutcome,
}

#[derive(Debug)]
struct MetricsInner {
    entries: VecDeque<WindowEntry>,
    total_requests: u64,
}

/// Aggregates per-request outcomes into rolling statistics.
///
/// Updates are serialized through an internal mutex; callers only ever see
/// consistent snapshots. The window is the only state that is ever reset;
/// `total_requests` is monotonic for the life of the value.
#[derive(Debug)]
pub struct MetricsAggregator {
    window: Duration,
    inner: Mutex<MetricsInner>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl MetricsAggregator {
    /// Create an aggregator with the given trailing window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Mutex::new(MetricsInner {
                entries: VecDeque::new(),
                total_requests: 0,
            }),
        }
    }

    /// Record a finished request.
    ///
    /// `started_at` places the record in the window; `latency` is absent
    /// for cancelled requests, which never contribute to `avg_latency_ms`.
    pub fn record(&self, outcome: RequestOutcome, started_at: Instant, latency: Option<Duration>) {
        self.record_at(Instant::now(), outcome, started_at, latency);
    }

    fn record_at(
        &self,
        now: Instant,
        outcome: RequestOutcome,
        started_at: Instant,
        latency: Option<Duration>,
    ) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        inner.entries.push_back(WindowEntry {
            started_at,
            latency,
            outcome,
        });
        Self::evict(&mut inner, now, self.window);
    }

    /// Compute current statistics over the trailing window.
    #[must_use]
    pub fn snapshot(&self) -> Stats {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> Stats {
        let mut inner = self.lock();
        Self::evict(&mut inner, now, self.window);

        let count = inner.entries.len();
        if count == 0 {
            return Stats {
                requests_per_minute: 0.0,
                avg_latency_ms: 0.0,
                total_requests: inner.total_requests,
                error_rate: 0.0,
            };
        }

        let failures = inner
            .entries
            .iter()
            .filter(|e| e.outcome.is_failure())
            .count();

        let latencies: Vec<Duration> = inner.entries.iter().filter_map(|e| e.latency).collect();
        let avg_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            let total_ms: f64 = latencies.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            total_ms / latencies.len() as f64
        };

        let scale = 60_000.0 / self.window.as_millis() as f64;
        Stats {
            requests_per_minute: count as f64 * scale,
            avg_latency_ms,
            total_requests: inner.total_requests,
            error_rate: failures as f64 / count as f64,
        }
    }

    /// Clear the rolling window. The monotonic total is untouched.
    pub fn reset_window(&self) {
        self.lock().entries.clear();
    }

    fn evict(inner: &mut MetricsInner, now: Instant, window: Duration) {
        while let Some(front) = inner.entries.front() {
            if now.saturating_duration_since(front.started_at) > window {
                inner.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_yields_exact_zeros() {
        let metrics = MetricsAggregator::default();
        let stats = metrics.snapshot();
        assert_eq!(stats.requests_per_minute, 0.0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.error_rate, 0.0);
        assert_eq!(stats.total_requests, 0);
    }

    #[test]
    fn successes_produce_latency_and_throughput() {
        let metrics = MetricsAggregator::default();
        let now = Instant::now();
        metrics.record_at(
            now,
            RequestOutcome::Success,
            now,
            Some(Duration::from_millis(100)),
        );
        metrics.record_at(
            now,
            RequestOutcome::Success,
            now,
            Some(Duration::from_millis(300)),
        );

        let stats = metrics.snapshot_at(now);
        assert_eq!(stats.total_requests, 2);
        assert!((stats.requests_per_minute - 2.0).abs() < f64::EPSILON);
        assert!((stats.avg_latency_ms - 200.0).abs() < 0.001);
        assert_eq!(stats.error_rate, 0.0);
    }

    #[test]
    fn cancellations_count_as_errors_without_latency() {
        let metrics = MetricsAggregator::default();
        let now = Instant::now();
        metrics.record_at(
            now,
            RequestOutcome::Success,
            now,
            Some(Duration::from_millis(50)),
        );
        metrics.record_at(now, RequestOutcome::Cancelled, now, None);
        metrics.record_at(now, RequestOutcome::Error, now, Some(Duration::from_millis(10)));

        let stats = metrics.snapshot_at(now);
        assert!((stats.error_rate - 2.0 / 3.0).abs() < 0.001);
        // Cancelled entry contributes no latency sample.
        assert!((stats.avg_latency_ms - 30.0).abs() < 0.001);
    }

    #[test]
    fn error_rate_is_non_decreasing_within_a_fixed_window() {
        let metrics = MetricsAggregator::default();
        let now = Instant::now();
        metrics.record_at(now, RequestOutcome::Success, now, Some(Duration::ZERO));

        let mut last_rate = metrics.snapshot_at(now).error_rate;
        for _ in 0..5 {
            metrics.record_at(now, RequestOutcome::Error, now, Some(Duration::ZERO));
            let rate = metrics.snapshot_at(now).error_rate;
            assert!(rate >= last_rate);
            last_rate = rate;
        }
    }

    #[test]
    fn old_entries_are_evicted_but_total_survives() {
        let metrics = MetricsAggregator::default();
        let now = Instant::now();
        metrics.record_at(
            now,
            RequestOutcome::Error,
            now,
            Some(Duration::from_millis(5)),
        );

        let later = now + Duration::from_secs(61);
        let stats = metrics.snapshot_at(later);
        assert_eq!(stats.requests_per_minute, 0.0);
        assert_eq!(stats.error_rate, 0.0);
        assert_eq!(stats.total_requests, 1);
    }

    #[test]
    fn throughput_extrapolates_from_shorter_windows() {
        let metrics = MetricsAggregator::new(Duration::from_secs(30));
        let now = Instant::now();
        for _ in 0..3 {
            metrics.record_at(now, RequestOutcome::Success, now, Some(Duration::ZERO));
        }
        // 3 requests in a 30s window extrapolate to 6 per minute.
        let stats = metrics.snapshot_at(now);
        assert!((stats.requests_per_minute - 6.0).abs() < 0.001);
    }

    #[test]
    fn reset_window_keeps_the_monotonic_total() {
        let metrics = MetricsAggregator::default();
        let now = Instant::now();
        metrics.record_at(now, RequestOutcome::Success, now, Some(Duration::ZERO));
        metrics.reset_window();

        let stats = metrics.snapshot_at(now);
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.requests_per_minute, 0.0);
    }
}
