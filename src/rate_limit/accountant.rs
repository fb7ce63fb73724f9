//! Fixed-window counting against a [`CounterStore`].

use super::headers::RateLimitHeaders;
use super::request::RateLimitRequest;
use super::store::{CounterStore, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::error::{RateLimitError, RateLimitExceeded};
use std::sync::Arc;

/// Result of the increment step.
#[derive(Debug)]
enum Increment {
    /// The store applied the increment; carries the new count.
    Counted(u64),
    /// The store could not be reached.
    StoreUnavailable(StoreError),
}

/// A request that stayed within its threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Count observed after the increment (zero if the store was unavailable).
    pub count: u64,
    pub threshold: u64,
    /// Headers, when the request asked for them.
    pub headers: Option<RateLimitHeaders>,
}

/// Counts requests in fixed windows and compares them to thresholds.
///
/// The accountant holds no per-check state; every call takes a
/// [`RateLimitRequest`] describing the key and window. Clones share the
/// store and clock.
///
/// # Failure policy
/// - A failed increment is logged and counted as zero: the request is let
///   through rather than blocked by an unavailable store.
/// - A failed expiration arming is returned to the caller. Swallowing it
///   would leave a counter that never resets.
#[derive(Debug)]
pub struct Accountant<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for Accountant<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), clock: Arc::clone(&self.clock) }
    }
}

impl<S: CounterStore> Accountant<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Build from a store that is already shared elsewhere.
    pub fn from_shared(store: Arc<S>) -> Self {
        Self { store, clock: Arc::new(SystemClock) }
    }

    /// Override the clock used to compute expiration instants.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn increment(&self, key: &str, amount: u64) -> Increment {
        match self.store.increment_by(key, amount).await {
            Ok(count) => Increment::Counted(count),
            Err(err) => Increment::StoreUnavailable(err),
        }
    }

    /// Add `amount` to the request's counter and return the new count.
    ///
    /// The first write of a window (count equal to `amount`) arms the key's
    /// expiration at now + interval. Concurrent first writers may both arm
    /// it; they set the same instant.
    ///
    /// # Errors
    /// Only an expiration arming failure is returned. An unavailable store on
    /// the increment yields `Ok(0)`.
    pub async fn record(&self, request: &RateLimitRequest, amount: u64) -> Result<u64, StoreError> {
        let key = request.key();

        let count = match self.increment(&key, amount).await {
            Increment::Counted(count) => count,
            Increment::StoreUnavailable(err) => {
                tracing::warn!(key = %key, error = %err, "counter store unavailable, failing open");
                return Ok(0);
            }
        };

        if count == amount {
            let expires_at = self.clock.now_unix_secs().saturating_add(request.interval_seconds());
            if let Err(err) = self.store.expire_at(&key, expires_at).await {
                tracing::error!(key = %key, error = %err, "failed to arm window expiration");
                return Err(err);
            }
            tracing::debug!(key = %key, expires_at, "window opened");
        }

        tracing::debug!(key = %key, count, amount, "recorded");
        Ok(count)
    }

    /// Record `amount` and reject when the count passes `threshold`.
    ///
    /// A count equal to `threshold` is still admitted. Headers are computed
    /// for both outcomes when the request asked for them.
    pub async fn limit(
        &self,
        request: &RateLimitRequest,
        threshold: u64,
        amount: u64,
    ) -> Result<Admission, RateLimitError> {
        let count = self.record(request, amount).await?;
        let headers = request.emit_headers().then(|| RateLimitHeaders::new(threshold, count));

        if count > threshold {
            let key = request.key();
            tracing::warn!(key = %key, count, threshold, "rate limit exceeded");
            return Err(RateLimitExceeded { key, count, threshold, headers }.into());
        }

        Ok(Admission { count, threshold, headers })
    }

    /// Delete every counter under the store prefix.
    ///
    /// Enumeration is not atomic with concurrent increments; use for tests and
    /// debugging, not under production traffic.
    pub async fn flush_all(&self) -> Result<usize, StoreError> {
        self.flush_by_lookup("*").await
    }

    /// Delete every counter whose key matches the glob `pattern`.
    /// Returns the number of keys deleted.
    pub async fn flush_by_lookup(&self, pattern: &str) -> Result<usize, StoreError> {
        let prefix = self.store.prefix();
        let keys: Vec<String> = self
            .store
            .keys_matching(pattern)
            .await?
            .into_iter()
            .map(|key| match key.strip_prefix(prefix) {
                Some(stripped) => stripped.to_string(),
                None => key,
            })
            .collect();

        if keys.is_empty() {
            return Ok(0);
        }

        self.store.delete_all(&keys).await?;
        tracing::info!(pattern, deleted = keys.len(), "flushed rate limit counters");
        Ok(keys.len())
    }
}
