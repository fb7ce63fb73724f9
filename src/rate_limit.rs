//! Fixed-window rate limiting.
//!
//! - [`RateLimitRequest`]: immutable description of one check (key segments,
//!   window length, whether to compute headers).
//! - [`Accountant`]: increments counters in a [`CounterStore`], arms window
//!   expiration and compares counts to thresholds.
//! - [`RateLimitLayer`]: Tower middleware enforcing hourly, per-minute and
//!   per-second windows per client address.
//!
//! Counters live in the store under `<prefix><tag>`, where the tag is the
//! `:`-terminated concatenation of the request's segments, for example
//! `rate_limits:203.0.113.5:requests:minute:`.

pub mod accountant;
pub mod headers;
pub mod middleware;
pub mod request;
pub mod store;
pub mod tag;
pub mod window;

pub use accountant::{Accountant, Admission};
pub use headers::RateLimitHeaders;
pub use middleware::{RateLimitLayer, RateLimitService};
pub use request::RateLimitRequest;
pub use store::{CounterStore, InMemoryCounterStore, StoreError};
#[cfg(feature = "redis")]
pub use store::{RedisCounterStore, RedisCounterStoreConfig};
pub use tag::{Tag, TagSegment};
pub use window::{Window, WindowLimits};
