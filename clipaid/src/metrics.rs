use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

const DEFAULT_WINDOW_SIZE: usize = 256;
const SPECULATIVE_P95_TARGET_MS: u64 = 3_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub samples: usize,
    pub average_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub generated_at_ms: u64,
    pub speculative_request: MetricSummary,
    pub session_request: MetricSummary,
    pub write_back: MetricSummary,
    pub accepted_copies: u64,
    pub rejected_copies: u64,
    pub suppressed_presentations: u64,
    pub speculative_hits: u64,
    pub speculative_waits: u64,
    pub refetches: u64,
    pub stale_results_dropped: u64,
    pub write_back_failures: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct RollingMetric {
    values: VecDeque<u64>,
    capacity: usize,
}

impl RollingMetric {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, value_ms: u64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value_ms);
    }

    /// Nearest-rank p95 over the retained window.
    fn summary(&self) -> MetricSummary {
        let mut sorted = self.values.iter().copied().collect::<Vec<_>>();
        sorted.sort_unstable();
        let Some(&max_ms) = sorted.last() else {
            return MetricSummary::default();
        };

        let samples = sorted.len();
        let total = sorted.iter().fold(0u64, |acc, value| acc.saturating_add(*value));
        let rank = (samples * 95).div_ceil(100).max(1);

        MetricSummary {
            samples,
            average_ms: total / samples as u64,
            p95_ms: sorted[rank - 1],
            max_ms,
        }
    }
}

/// Latency windows and counters owned by the control task.
#[derive(Debug)]
pub struct RuntimeMetrics {
    speculative_request_ms: RollingMetric,
    session_request_ms: RollingMetric,
    write_back_ms: RollingMetric,
    accepted_copies: u64,
    rejected_copies: u64,
    suppressed_presentations: u64,
    speculative_hits: u64,
    speculative_waits: u64,
    refetches: u64,
    stale_results_dropped: u64,
    write_back_failures: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self {
            speculative_request_ms: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            session_request_ms: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            write_back_ms: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            accepted_copies: 0,
            rejected_copies: 0,
            suppressed_presentations: 0,
            speculative_hits: 0,
            speculative_waits: 0,
            refetches: 0,
            stale_results_dropped: 0,
            write_back_failures: 0,
        }
    }

    pub fn record_speculative_request(&mut self, elapsed: Duration) {
        self.speculative_request_ms.record(as_millis(elapsed));
    }

    pub fn record_session_request(&mut self, elapsed: Duration) {
        self.session_request_ms.record(as_millis(elapsed));
    }

    pub fn record_write_back(&mut self, elapsed: Duration, succeeded: bool) {
        self.write_back_ms.record(as_millis(elapsed));
        if !succeeded {
            self.write_back_failures += 1;
        }
    }

    pub fn record_accepted_copy(&mut self) {
        self.accepted_copies += 1;
    }

    pub fn record_rejected_copy(&mut self) {
        self.rejected_copies += 1;
    }

    pub fn record_suppressed_presentation(&mut self) {
        self.suppressed_presentations += 1;
    }

    pub fn record_speculative_hit(&mut self) {
        self.speculative_hits += 1;
    }

    pub fn record_speculative_wait(&mut self) {
        self.speculative_waits += 1;
    }

    pub fn record_refetch(&mut self) {
        self.refetches += 1;
    }

    pub fn record_stale_drop(&mut self) {
        self.stale_results_dropped += 1;
    }

    pub fn report(&self) -> PerformanceReport {
        let speculative_request = self.speculative_request_ms.summary();
        let session_request = self.session_request_ms.summary();
        let write_back = self.write_back_ms.summary();

        let mut warnings = Vec::new();
        if self.write_back_failures > 0 {
            warnings.push(format!(
                "Clipboard write-back failed {} times after retries.",
                self.write_back_failures
            ));
        }
        if speculative_request.samples > 0 && speculative_request.p95_ms > SPECULATIVE_P95_TARGET_MS
        {
            warnings.push(format!(
                "Speculative request P95 latency {}ms exceeded target {}ms.",
                speculative_request.p95_ms, SPECULATIVE_P95_TARGET_MS
            ));
        }

        PerformanceReport {
            generated_at_ms: now_epoch_ms(),
            speculative_request,
            session_request,
            write_back,
            accepted_copies: self.accepted_copies,
            rejected_copies: self.rejected_copies,
            suppressed_presentations: self.suppressed_presentations,
            speculative_hits: self.speculative_hits,
            speculative_waits: self.speculative_waits,
            refetches: self.refetches,
            stale_results_dropped: self.stale_results_dropped,
            write_back_failures: self.write_back_failures,
            warnings,
        }
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn as_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(as_millis)
        .unwrap_or(0)
}
