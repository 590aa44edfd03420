use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{clock::DynClock, reaper::Sweep};

use super::RateLimiter;

/// The maximum number of distinct keys a limiter tracks by default.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// A sliding window rate limiter kept in memory.
///
/// For every key the limiter remembers when each allowed request happened. A
/// request is allowed while fewer than `max_requests` of those timestamps fall
/// within the trailing `window`.
///
/// The number of tracked keys is capped. A request for an untracked key while
/// the cap is reached first drops keys with no requests left in their window,
/// and is rejected if that frees nothing.
pub struct SlidingWindowLimiter {
    clock: DynClock,
    max_keys: usize,
    max_requests: usize,
    name: &'static str,
    requests: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    window: Duration,
}

impl SlidingWindowLimiter {
    /// Create a new limiter tracking at most [`DEFAULT_MAX_KEYS`] keys.
    ///
    /// # Arguments
    ///
    /// * `name` - Identifies the limiter in logs.
    /// * `clock` - The time source for the window.
    /// * `max_requests` - Requests allowed per key within one window.
    /// * `window` - Length of the trailing window.
    pub fn new(
        name: &'static str,
        clock: DynClock,
        max_requests: usize,
        window: Duration,
    ) -> Self {
        Self {
            clock,
            max_keys: DEFAULT_MAX_KEYS,
            max_requests,
            name,
            requests: Mutex::new(HashMap::new()),
            window,
        }
    }

    #[must_use]
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// The number of requests for `key` that currently count against its
    /// limit. Does not record anything.
    pub fn recorded(&self, key: &str) -> usize {
        let cutoff = self.clock.now() - self.window;

        self.requests
            .lock()
            .get(key)
            .map(|timestamps| timestamps.iter().filter(|t| **t >= cutoff).count())
            .unwrap_or(0)
    }

    pub fn tracked_keys(&self) -> usize {
        self.requests.lock().len()
    }

    /// Forget timestamps that have left the window, and keys left with none.
    ///
    /// # Returns
    ///
    /// The number of keys dropped.
    pub fn prune(&self) -> usize {
        let cutoff = self.clock.now() - self.window;
        let mut requests = self.requests.lock();

        prune_before(&mut requests, cutoff)
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn allow_request(&self, key: &str) -> bool {
        let now = self.clock.now();
        let cutoff = now - self.window;
        let mut requests = self.requests.lock();

        if !requests.contains_key(key) && requests.len() >= self.max_keys {
            prune_before(&mut requests, cutoff);

            if requests.len() >= self.max_keys {
                warn!(
                    limiter = self.name,
                    max_keys = self.max_keys,
                    "Rate limiter is tracking too many keys, rejecting new key."
                );

                return false;
            }
        }

        let timestamps = requests.entry(key.to_owned()).or_default();
        timestamps.retain(|t| *t >= cutoff);

        if timestamps.len() >= self.max_requests {
            debug!(limiter = self.name, "Request rate limited.");

            // Don't leave an empty entry behind for a limiter that allows
            // nothing.
            if timestamps.is_empty() {
                requests.remove(key);
            }

            return false;
        }

        timestamps.push(now);

        true
    }
}

impl Sweep for SlidingWindowLimiter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn sweep(&self) -> usize {
        self.prune()
    }
}

fn prune_before(requests: &mut HashMap<String, Vec<DateTime<Utc>>>, cutoff: DateTime<Utc>) -> usize {
    let before = requests.len();

    requests.retain(|_, timestamps| {
        timestamps.retain(|t| *t >= cutoff);
        !timestamps.is_empty()
    });

    before - requests.len()
}
