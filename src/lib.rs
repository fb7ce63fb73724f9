#![forbid(unsafe_code)]

//! # tollgate
//!
//! Fixed-window rate limiting for HTTP services, with counters kept in a
//! shared store so every application instance sees the same totals.
//!
//! ## Features
//!
//! - **Client identity** from the connection address or trusted proxy headers
//! - **Fixed windows** counted with an atomic increment and a one-time expiration
//! - **Fail-open** when the counter store cannot be reached
//! - **Tower middleware** enforcing hourly, per-minute and per-second windows
//! - **Redis backend** behind the `redis` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use tollgate::{Accountant, InMemoryCounterStore, RateLimitRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let accountant = Accountant::new(InMemoryCounterStore::new());
//!     let request = RateLimitRequest::new()
//!         .with_user_id("100")
//!         .with_name("uploads")
//!         .with_time_interval(60);
//!
//!     // At most 10 uploads per minute for user 100.
//!     match accountant.limit(&request, 10, 1).await {
//!         Ok(admission) => println!("admitted, count {}", admission.count),
//!         Err(err) => println!("rejected: {err}"),
//!     }
//! }
//! ```

pub mod clock;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod identity;
pub mod rate_limit;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, RateLimitSettings};
pub use dynamic::DynamicConfig;
pub use error::{InterceptError, RateLimitError, RateLimitExceeded};
pub use identity::{IdentityResolver, InboundRequest, RemoteAddr};
pub use rate_limit::{
    Accountant, Admission, CounterStore, InMemoryCounterStore, RateLimitHeaders, RateLimitLayer,
    RateLimitRequest, RateLimitService, StoreError, Window, WindowLimits,
};
#[cfg(feature = "redis")]
pub use rate_limit::{RedisCounterStore, RedisCounterStoreConfig};
