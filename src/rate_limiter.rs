// Sliding-window rate limiter with exponential backoff
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::time::sleep;

use crate::error::{PriceError, Result};

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Maximum number of calls admitted within one window.
    pub max_requests: usize,
    pub window: Duration,
    /// Base delay of the exponential backoff.
    pub retry_after: Duration,
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
            retry_after: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    recent_calls: VecDeque<Instant>,
    retry_counts: HashMap<String, u32>,
}

impl LimiterState {
    fn prune(&mut self, window: Duration) {
        let now = Instant::now();
        while let Some(oldest) = self.recent_calls.front() {
            if now.duration_since(*oldest) > window {
                self.recent_calls.pop_front();
            } else {
                break;
            }
        }
    }
}

enum Admission {
    Admitted,
    Backoff(Duration),
    Exhausted,
}

/// All keys share one request window. Retry counters are kept per key; the
/// n-th retry waits `retry_after * 2^n` until `max_retries` is reached.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Lock the limiter state, recovering from poison if necessary.
    fn lock_state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter state mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Runs `operation` once a slot is available in the window.
    ///
    /// `operation` is invoked again for every throttling retry, so it must
    /// produce a fresh future on each call.
    pub async fn execute<T, F, Fut>(&self, key: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut throttle_retries: u32 = 0;

        loop {
            match self.admit(key) {
                Admission::Admitted => {}
                Admission::Backoff(delay) => {
                    debug!("Rate limiter: window full, waiting {:?} for '{}'", delay, key);
                    sleep(delay).await;
                    continue;
                }
                Admission::Exhausted => {
                    warn!("Rate limiter: retries exhausted for '{}'", key);
                    return Err(PriceError::RateLimitExceeded(key.to_string()));
                }
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_throttling() => {
                    if throttle_retries >= self.config.max_retries {
                        warn!("Rate limiter: upstream keeps throttling '{}': {}", key, err);
                        return Err(PriceError::RateLimitExceeded(key.to_string()));
                    }
                    let delay = self.backoff_delay(throttle_retries);
                    throttle_retries += 1;
                    debug!(
                        "Rate limiter: upstream throttled '{}', retrying in {:?} (attempt {}/{})",
                        key, delay, throttle_retries, self.config.max_retries
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn admit(&self, key: &str) -> Admission {
        let mut state = self.lock_state();
        state.prune(self.config.window);

        if state.recent_calls.len() >= self.config.max_requests {
            let retries = state.retry_counts.get(key).copied().unwrap_or(0);
            if retries >= self.config.max_retries {
                state.retry_counts.remove(key);
                return Admission::Exhausted;
            }
            state.retry_counts.insert(key.to_string(), retries + 1);
            return Admission::Backoff(self.backoff_delay(retries));
        }

        state.recent_calls.push_back(Instant::now());
        state.retry_counts.remove(key);
        Admission::Admitted
    }

    fn backoff_delay(&self, retries: u32) -> Duration {
        let factor = 1u32.checked_shl(retries).unwrap_or(u32::MAX);
        self.config.retry_after.saturating_mul(factor)
    }

    /// Number of calls currently counted against the window.
    pub fn in_window(&self) -> usize {
        let mut state = self.lock_state();
        state.prune(self.config.window);
        state.recent_calls.len()
    }

    pub fn retry_count(&self, key: &str) -> u32 {
        self.lock_state().retry_counts.get(key).copied().unwrap_or(0)
    }

    /// Forget all recorded calls and retry counters.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.recent_calls.clear();
        state.retry_counts.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
