//! Error types for rate limit checks and the interceptor.
use crate::rate_limit::headers::RateLimitHeaders;
use crate::rate_limit::store::StoreError;
use std::fmt;

/// A window's count went past its threshold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for `{key}` ({count} > {threshold})")]
pub struct RateLimitExceeded {
    /// Counter key, without the store prefix.
    pub key: String,
    /// Count observed after the increment.
    pub count: u64,
    /// Maximum permitted count within the window.
    pub threshold: u64,
    /// Headers, when the check asked for them.
    pub headers: Option<RateLimitHeaders>,
}

/// Failures of [`Accountant::limit`](crate::Accountant::limit).
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The caller is over the limit.
    #[error(transparent)]
    Exceeded(#[from] RateLimitExceeded),
    /// The store accepted the increment but could not arm the window expiration.
    #[error("failed to arm window expiration: {0}")]
    Store(#[from] StoreError),
}

impl RateLimitError {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded(_))
    }

    pub fn as_exceeded(&self) -> Option<&RateLimitExceeded> {
        match self {
            Self::Exceeded(e) => Some(e),
            Self::Store(_) => None,
        }
    }
}

/// Error returned by [`RateLimitService`](crate::RateLimitService).
#[derive(Debug)]
pub enum InterceptError<E> {
    /// A window rejected the request; the inner service was not called.
    RateLimited(RateLimitExceeded),
    /// Arming a window expiration failed; the inner service was not called.
    Store(StoreError),
    /// The wrapped service failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for InterceptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited(e) => write!(f, "{}", e),
            Self::Store(e) => write!(f, "rate limit store failure: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for InterceptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RateLimited(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Inner(e) => Some(e),
        }
    }
}

impl<E> From<RateLimitError> for InterceptError<E> {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded(e) => Self::RateLimited(e),
            RateLimitError::Store(e) => Self::Store(e),
        }
    }
}

impl<E> InterceptError<E> {
    /// Check if the request was rejected by a rate limit
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
    /// Check if the counter store failed
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Access the exceeded window if this is a rate limit rejection.
    pub fn rate_limited(&self) -> Option<&RateLimitExceeded> {
        match self {
            Self::RateLimited(e) => Some(e),
            _ => None,
        }
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
