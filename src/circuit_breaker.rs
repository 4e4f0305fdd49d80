//! Circuit Breaker for Upstream Providers
//!
//! Short-circuits calls to a provider that keeps failing, so a dead upstream
//! costs one fast `CircuitOpen` instead of a full retry cycle per search.
//! States: Closed (normal) -> Open (rejecting) -> HalfOpen (probing)
//!
//! Opt-in: the aggregation core is stateless per request, and the breaker is
//! the only piece of state that outlives a search.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected until `open_duration` elapses
    Open,
    /// A limited number of probe calls decide between Closed and Open
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    pub open_duration: Duration,
    /// Probe successes needed to close again
    pub success_threshold: u32,
    /// Concurrent probes admitted while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 1,
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    probes_in_flight: u32,
    opened_at: Option<Instant>,
    trips: u64,
}

/// Breaker guarding one upstream source
#[derive(Debug)]
pub struct CircuitBreaker {
    source: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(source: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            source: source.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                probes_in_flight: 0,
                opened_at: None,
                trips: 0,
            }),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Number of times the circuit has opened
    pub fn trips(&self) -> u64 {
        self.inner.lock().trips
    }

    /// Returns true when a call may go out now
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_duration)
                    .unwrap_or(true);
                if !cooled_down {
                    debug!(source = %self.source, "Circuit open, call rejected");
                    return false;
                }
                info!(source = %self.source, "Circuit half-open, probing upstream");
                inner.state = CircuitState::HalfOpen;
                inner.probe_successes = 0;
                inner.probes_in_flight = 1;
                true
            }
            CircuitState::HalfOpen => {
                if inner.probes_in_flight < self.config.half_open_max_calls {
                    inner.probes_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.success_threshold {
                    info!(source = %self.source, "Circuit closed, upstream recovered");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        source = %self.source,
                        failures = inner.consecutive_failures,
                        open_secs = self.config.open_duration.as_secs(),
                        "Circuit opened"
                    );
                    Self::open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                warn!(source = %self.source, "Probe failed, circuit re-opened");
                Self::open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_successes = 0;
        inner.probes_in_flight = 0;
        inner.opened_at = None;
    }

    fn open(inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probes_in_flight = 0;
        inner.probe_successes = 0;
        inner.trips += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            open_duration: Duration::from_secs(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new("newsapi", config(3));

        assert!(cb.allow_request());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
        assert_eq!(cb.trips(), 1);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = CircuitBreaker::new("twitter", config(2));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_closes_on_success() {
        let cb = CircuitBreaker::new("sdg-poland", config(1));
        cb.record_failure();
        assert!(!cb.allow_request());

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // only one probe at a time
        assert!(!cb.allow_request());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new("dane-gov-pl", config(1));
        cb.record_failure();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cb.allow_request());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.trips(), 2);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
