use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{header::HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::backoff::{BackoffPolicy, Delay};
use crate::config::ProviderConfig;
use crate::error::{Result, SyncError};
use crate::metrics::{MetricsCollector, RequestOutcome};
use crate::provider::{ApiMatch, MatchesResponse, StandingsResponse};

const AUTH_HEADER: &str = "X-Auth-Token";
const RESET_HEADERS: [&str; 2] = ["X-RequestCounter-Reset", "Retry-After"];

/// Spaces outbound calls evenly across a calls-per-minute budget.
///
/// The limiter state is the "last call" cursor. A slot is claimed before a
/// request goes out, so failed requests still count against the budget.
pub struct RequestPacer<C: Clock = DefaultClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
    clock: C,
}

impl RequestPacer<DefaultClock> {
    pub fn per_minute(budget: NonZeroU32) -> Self {
        Self::with_clock(budget, DefaultClock::default())
    }
}

impl<C: Clock> RequestPacer<C> {
    pub fn with_clock(budget: NonZeroU32, clock: C) -> Self {
        let spacing = Duration::from_secs(60) / budget.get();
        let quota = Quota::with_period(spacing).unwrap_or_else(|| Quota::per_minute(budget));
        let limiter = RateLimiter::direct_with_clock(quota, &clock);
        Self { limiter, clock }
    }

    /// Waits until the next slot is free and claims it. Returns the time spent
    /// waiting, or `Cancelled` if shutdown interrupted the wait.
    pub async fn acquire(&self, delay: &dyn Delay) -> Result<Duration> {
        let mut waited = Duration::ZERO;
        loop {
            match self.limiter.check() {
                Ok(()) => return Ok(waited),
                Err(not_until) => {
                    let wait = not_until.wait_time_from(self.clock.now());
                    if !delay.sleep(wait).await {
                        return Err(SyncError::Cancelled);
                    }
                    waited += wait;
                }
            }
        }
    }
}

fn reset_hint(headers: &HeaderMap) -> Option<Duration> {
    RESET_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    })
}

pub struct Fetcher<C: Clock = DefaultClock> {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    pacer: RequestPacer<C>,
    backoff: BackoffPolicy,
    delay: Arc<dyn Delay>,
    metrics: MetricsCollector,
}

impl Fetcher<DefaultClock> {
    pub fn from_config(config: &ProviderConfig, delay: Arc<dyn Delay>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self::new(
            client,
            &config.base_url,
            &config.api_key,
            RequestPacer::per_minute(config.calls_per_minute),
            BackoffPolicy::new(
                config.max_attempts,
                Duration::from_secs(config.throttle_delay_secs),
            ),
            delay,
        ))
    }
}

impl<C: Clock> Fetcher<C> {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        pacer: RequestPacer<C>,
        backoff: BackoffPolicy,
        delay: Arc<dyn Delay>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            pacer,
            backoff,
            delay,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Issues a GET against `endpoint` under the rate budget, retrying
    /// throttled responses and transport errors up to the backoff limit.
    /// Any wait interrupted by shutdown ends the call with `Cancelled`.
    pub async fn fetch(&self, endpoint: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut attempt = 1;

        loop {
            let waited = self.pacer.acquire(self.delay.as_ref()).await?;
            self.metrics.record_wait(waited);

            let tracker = self.metrics.start_request();
            debug!("GET {} (attempt {})", url, attempt);
            let response = match self
                .client
                .get(&url)
                .header(AUTH_HEADER, &self.api_key)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracker.finish(RequestOutcome::Failed);
                    self.metrics.record_error(e.to_string());
                    if !self.backoff.should_retry(attempt) {
                        return Err(e.into());
                    }
                    let wait = self.backoff.delay_for(None);
                    warn!("Request to {} failed ({}), retrying in {:?}", endpoint, e, wait);
                    self.metrics.record_retry();
                    if !self.delay.sleep(wait).await {
                        return Err(SyncError::Cancelled);
                    }
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                tracker.finish(RequestOutcome::Throttled);
                if !self.backoff.should_retry(attempt) {
                    let err = SyncError::Throttled {
                        endpoint: endpoint.to_string(),
                        attempts: attempt,
                    };
                    self.metrics.record_error(err.to_string());
                    return Err(err);
                }
                let wait = self.backoff.delay_for(reset_hint(response.headers()));
                warn!(
                    "Throttled on {} (attempt {}/{}), waiting {:?}",
                    endpoint, attempt, self.backoff.max_attempts, wait
                );
                self.metrics.record_retry();
                if !self.delay.sleep(wait).await {
                    return Err(SyncError::Cancelled);
                }
                attempt += 1;
                continue;
            }

            if status != StatusCode::OK {
                tracker.finish(RequestOutcome::Failed);
                let err = SyncError::UnexpectedStatus {
                    endpoint: endpoint.to_string(),
                    status: status.as_u16(),
                };
                self.metrics.record_error(err.to_string());
                return Err(err);
            }

            return match response.bytes().await {
                Ok(body) => {
                    tracker.finish(RequestOutcome::Success);
                    Ok(body.to_vec())
                }
                Err(e) => {
                    tracker.finish(RequestOutcome::Failed);
                    self.metrics.record_error(e.to_string());
                    Err(e.into())
                }
            };
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let body = self.fetch(endpoint).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn fetch_matches(&self, competition: &str) -> Result<Vec<ApiMatch>> {
        let response: MatchesResponse = self
            .fetch_json(&format!("competitions/{}/matches", competition))
            .await?;
        Ok(response.matches)
    }

    /// League position per team id for one competition.
    pub async fn fetch_standings(&self, competition: &str) -> Result<HashMap<i64, u32>> {
        let response: StandingsResponse = self
            .fetch_json(&format!("competitions/{}/standings", competition))
            .await?;
        Ok(response.positions())
    }
}
