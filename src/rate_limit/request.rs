//! Immutable description of one rate limit check.

use super::tag::{Tag, TagSegment};
use crate::identity::{IdentityResolver, InboundRequest};
use std::net::IpAddr;

/// What to count, and for how long.
///
/// Every `with_*` method consumes the value and returns an extended copy, so a
/// request is built fresh for each check and nothing leaks from one check
/// into the next.
///
/// ```
/// use tollgate::RateLimitRequest;
///
/// let request = RateLimitRequest::new()
///     .with_user_id("100")
///     .with_name("request_name")
///     .with_time_interval(60);
/// assert_eq!(request.key(), "100:request_name:");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitRequest {
    tag: Tag,
    interval_seconds: u64,
    emit_headers: bool,
}

impl RateLimitRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action name segment.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.tag = self.tag.push(TagSegment::Name(name.into()));
        self
    }

    /// Append a caller supplied identity segment.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.tag = self.tag.push(TagSegment::UserId(user_id.into()));
        self
    }

    /// Resolve the client address of `request` and append it.
    pub fn with_client_identity<R>(self, resolver: &IdentityResolver, request: &R) -> Self
    where
        R: InboundRequest + ?Sized,
    {
        let ip = resolver.resolve_request(request);
        self.with_client_ip(ip)
    }

    /// Append an already resolved client address.
    pub fn with_client_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.tag = self.tag.push(TagSegment::ClientIp(ip));
        self
    }

    /// Set the window length. Zero arms an expiration at "now"; callers that
    /// mean "disabled" should skip the check instead.
    pub fn with_time_interval(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    /// Ask for `X-Rate-Limit-*` headers in the check result.
    pub fn with_rate_limit_headers(mut self, emit: bool) -> Self {
        self.emit_headers = emit;
        self
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Counter store key for this request.
    pub fn key(&self) -> String {
        self.tag.key()
    }

    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    pub fn emit_headers(&self) -> bool {
        self.emit_headers
    }
}
