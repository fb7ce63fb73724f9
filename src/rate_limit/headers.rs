//! Informational `X-Rate-Limit-*` response headers.

use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Total requests allowed in the window.
pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
/// Requests left in the window.
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";

/// Limit and remaining count surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u64,
    pub remaining: u64,
}

impl RateLimitHeaders {
    /// Headers for a window holding `count` hits against `threshold`.
    /// `remaining` bottoms out at zero once the window is exhausted.
    pub fn new(threshold: u64, count: u64) -> Self {
        Self { limit: threshold, remaining: threshold.saturating_sub(count) }
    }

    /// Insert both headers, replacing any existing values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(HeaderName::from_static(LIMIT_HEADER), HeaderValue::from(self.limit));
        headers.insert(HeaderName::from_static(REMAINING_HEADER), HeaderValue::from(self.remaining));
    }

    /// Return `response` with both headers set.
    pub fn decorate<B>(&self, mut response: http::Response<B>) -> http::Response<B> {
        self.apply(response.headers_mut());
        response
    }
}
