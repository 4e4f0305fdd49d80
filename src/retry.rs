//! Retry Wrapper
//!
//! Resolves one registered source for one request:
//!
//! ```text
//! Attempting(1) ──ok──▶ Succeeded
//!      │ retryable error, attempts left
//!      ▼
//! Attempting(n+1) ... ──▶ Exhausted ──▶ fallback (once) ──▶ Fallback | Failed
//! ```
//!
//! Every attempt is bounded by the per-call timeout, which starts once a
//! concurrency permit is held. The per-source deadline bounds the primary
//! retries; when it fires the primary counts as exhausted and the fallback
//! still gets its one call. The wrapper never returns an error: failures
//! become a `SourceOutcome` with no results.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

use crate::error::AdapterError;
use crate::metrics;
use crate::schemas::{SearchRequest, SearchResult, SourceId};
use crate::sources::{RegisteredSource, SourceAdapter, SourcePage};

const ROUTE_PRIMARY: &str = "primary";
const ROUTE_FALLBACK: &str = "fallback";

/// Retry, timeout and deadline settings shared by every source
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomization factor in `0.0..=1.0`; zero gives exact delays
    pub jitter: f64,
    /// Bound on a single adapter call
    pub call_timeout: Duration,
    /// Bound on the primary retries of one source
    pub deadline: Duration,
    /// Adapter calls in flight across all sources
    pub max_concurrent_calls: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
            call_timeout: Duration::from_secs(8),
            deadline: Duration::from_secs(20),
            max_concurrent_calls: 16,
        }
    }
}

impl RetryPolicy {
    /// Delay schedule `base * 2^retry`, capped at `max_delay`
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(self.jitter)
            .with_max_elapsed_time(None)
            .build()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// States of one primary resolution
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    /// About to run attempt `n` (1-based)
    Attempting(u32),
    Succeeded { page: SourcePage, attempts: u32 },
    Exhausted { error: AdapterError, attempts: u32 },
}

impl RetryState {
    /// Transition after attempt `attempt` finished with `result`
    pub fn after_attempt(
        attempt: u32,
        result: Result<SourcePage, AdapterError>,
        policy: &RetryPolicy,
    ) -> Self {
        match result {
            Ok(page) => RetryState::Succeeded {
                page,
                attempts: attempt,
            },
            Err(error) if error.is_retryable() && attempt < policy.max_attempts() => {
                RetryState::Attempting(attempt + 1)
            }
            Err(error) => RetryState::Exhausted {
                error,
                attempts: attempt,
            },
        }
    }
}

/// How a source was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Primary { attempts: u32 },
    /// Primary exhausted, fallback answered
    Fallback { primary_error: AdapterError },
    Failed { error: AdapterError },
}

/// Final per-source result handed to the merger
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub source: SourceId,
    pub results: Vec<SearchResult>,
    pub total_results: u64,
    pub resolution: Resolution,
}

impl SourceOutcome {
    pub fn succeeded(source: SourceId, page: SourcePage, resolution: Resolution) -> Self {
        Self {
            source,
            results: page.items,
            total_results: page.total_results,
            resolution,
        }
    }

    pub fn failed(source: SourceId, error: AdapterError) -> Self {
        Self {
            source,
            results: Vec::new(),
            total_results: 0,
            resolution: Resolution::Failed { error },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.resolution, Resolution::Failed { .. })
    }

    pub fn error(&self) -> Option<&AdapterError> {
        match &self.resolution {
            Resolution::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Runs registered sources under a `RetryPolicy`
#[derive(Debug, Clone)]
pub struct RetryWrapper {
    policy: RetryPolicy,
    limiter: Arc<Semaphore>,
}

impl RetryWrapper {
    pub fn new(policy: RetryPolicy) -> Self {
        let limiter = Arc::new(Semaphore::new(policy.max_concurrent_calls.max(1)));
        Self { policy, limiter }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Waits for a slot in the process-wide call limit
    pub(crate) async fn permit(&self) -> Result<SemaphorePermit<'_>, AdapterError> {
        self.limiter
            .acquire()
            .await
            .map_err(|_| AdapterError::UpstreamUnavailable("call limiter closed".to_string()))
    }

    /// Resolves one source; never fails past this boundary
    pub async fn run(&self, source: &RegisteredSource, request: &SearchRequest) -> SourceOutcome {
        let id = source.id().clone();
        let _timer = metrics::SourceTimer::new(id.as_str());

        let primary_error = match self.primary_within_deadline(source, request).await {
            Ok((page, attempts)) => {
                debug!(source = %id, attempts = attempts, items = page.items.len(), "Source resolved");
                return SourceOutcome::succeeded(id, page, Resolution::Primary { attempts });
            }
            Err(error) => error,
        };

        let Some(fallback) = &source.fallback else {
            warn!(source = %id, error = %primary_error, "Source failed, no fallback registered");
            return SourceOutcome::failed(id, primary_error);
        };

        info!(
            source = %id,
            fallback = fallback.name(),
            error = %primary_error,
            "Primary exhausted, trying fallback"
        );

        match self.attempt(fallback.as_ref(), request, ROUTE_FALLBACK).await {
            Ok(page) => {
                metrics::record_fallback(id.as_str(), true);
                SourceOutcome::succeeded(id, page, Resolution::Fallback { primary_error })
            }
            Err(error) => {
                metrics::record_fallback(id.as_str(), false);
                warn!(source = %id, error = %error, "Fallback failed");
                SourceOutcome::failed(id, error)
            }
        }
    }

    /// Primary retries cut off at the per-source deadline
    async fn primary_within_deadline(
        &self,
        source: &RegisteredSource,
        request: &SearchRequest,
    ) -> Result<(SourcePage, u32), AdapterError> {
        let retries = self.call_with_retry(source.primary.as_ref(), request);
        match tokio::time::timeout(self.policy.deadline, retries).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    source = %source.id(),
                    deadline_ms = self.policy.deadline.as_millis() as u64,
                    "Source deadline exceeded"
                );
                Err(AdapterError::UpstreamUnavailable(format!(
                    "deadline of {:?} exceeded",
                    self.policy.deadline
                )))
            }
        }
    }

    /// Drives the retry state machine over the primary adapter
    async fn call_with_retry(
        &self,
        adapter: &dyn SourceAdapter,
        request: &SearchRequest,
    ) -> Result<(SourcePage, u32), AdapterError> {
        let mut backoff = self.policy.backoff();
        let mut state = RetryState::Attempting(1);

        loop {
            match state {
                RetryState::Attempting(attempt) => {
                    let result = self.attempt(adapter, request, ROUTE_PRIMARY).await;
                    state = RetryState::after_attempt(attempt, result, &self.policy);

                    if let RetryState::Attempting(next) = state {
                        let delay = backoff.next_backoff().unwrap_or(self.policy.max_delay);
                        metrics::record_retry(adapter.id().as_str());
                        warn!(
                            source = %adapter.id(),
                            attempt = attempt,
                            next_attempt = next,
                            delay_ms = delay.as_millis() as u64,
                            "Retryable error, will retry"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryState::Succeeded { page, attempts } => return Ok((page, attempts)),
                RetryState::Exhausted { error, attempts } => {
                    debug!(
                        source = %adapter.id(),
                        attempts = attempts,
                        error_kind = error.kind(),
                        "Retries exhausted"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// One adapter call bounded by the per-call timeout
    async fn attempt(
        &self,
        adapter: &dyn SourceAdapter,
        request: &SearchRequest,
        route: &str,
    ) -> Result<SourcePage, AdapterError> {
        // queueing for a permit is not upstream time
        let _permit = self.permit().await?;
        let result = match tokio::time::timeout(self.policy.call_timeout, adapter.fetch(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(AdapterError::UpstreamUnavailable(format!(
                "{} timed out after {:?}",
                adapter.name(),
                self.policy.call_timeout
            ))),
        };

        metrics::record_source_call(adapter.id().as_str(), route, result.as_ref().map(|_| ()));
        result
    }
}
