use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

const LATENCY_SMOOTHING: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Throttled,
    Failed,
}

/// Counters of one fetcher since it was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub throttled_responses: u64,
    pub retries: u64,
    pub avg_response_time_ms: f64,
    pub last_wait_ms: u64,
    pub total_wait_ms: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl fmt::Display for FetchMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests ({} ok, {} failed, {} throttled, {} retries), avg {:.1}ms, waited {}ms for the rate budget",
            self.total_requests,
            self.successful_requests,
            self.failed_requests,
            self.throttled_responses,
            self.retries,
            self.avg_response_time_ms,
            self.total_wait_ms
        )?;
        if let Some(error) = &self.last_error {
            write!(f, ", last error: {}", error)?;
        }
        Ok(())
    }
}

/// Shared handle; clones record into the same counters.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<FetchMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FetchMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_request(&self) -> RequestTracker {
        RequestTracker {
            started: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_wait(&self, waited: Duration) {
        let millis = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
        let mut metrics = self.lock();
        metrics.last_wait_ms = millis;
        metrics.total_wait_ms = metrics.total_wait_ms.saturating_add(millis);
    }

    pub fn record_retry(&self) {
        self.lock().retries += 1;
    }

    pub fn record_error(&self, error: impl Into<String>) {
        let mut metrics = self.lock();
        metrics.last_error = Some(error.into());
        metrics.last_error_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> FetchMetrics {
        self.lock().clone()
    }
}

/// Measures one request from `start_request` until `finish`.
pub struct RequestTracker {
    started: Instant,
    collector: MetricsCollector,
}

impl RequestTracker {
    pub fn finish(self, outcome: RequestOutcome) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut metrics = self.collector.lock();

        metrics.total_requests += 1;
        match outcome {
            RequestOutcome::Success => metrics.successful_requests += 1,
            RequestOutcome::Throttled => metrics.throttled_responses += 1,
            RequestOutcome::Failed => metrics.failed_requests += 1,
        }

        metrics.avg_response_time_ms = if metrics.total_requests == 1 {
            elapsed_ms
        } else {
            metrics.avg_response_time_ms * (1.0 - LATENCY_SMOOTHING)
                + elapsed_ms * LATENCY_SMOOTHING
        };
    }
}
