//! Client identity resolution.
//!
//! A client is identified by a single validated IP address taken from either
//! the transport-level peer address or a trusted proxy header. Headers are
//! inspected in the configured priority order; the first one carrying a valid
//! address wins over the peer address.
//!
//! Multi-hop `X-Forwarded-For` chains are resolved to their leftmost
//! (client-closest) entry.

use http::header::{HeaderMap, HeaderName};
use std::net::{IpAddr, SocketAddr};

/// Header trusted when no explicit list is configured.
pub const DEFAULT_TRUSTED_HEADER: &str = "x-forwarded-for";

/// Transport-level peer address of a request.
///
/// Host servers insert this into the request extensions when accepting a
/// connection; it plays the role of `REMOTE_ADDR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// The parts of an inbound request the resolver needs to read.
pub trait InboundRequest {
    /// Connection-level source address, unvalidated.
    fn connection_address(&self) -> Option<String>;

    /// All values of `name` joined with `", "`, or `None` if the header is absent.
    fn header_line(&self, name: &HeaderName) -> Option<String>;
}

/// Join every value of `name` into one comma-separated line.
///
/// Values that are not visible ASCII are skipped.
pub fn header_line(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let mut values = headers.get_all(name).iter().peekable();
    values.peek()?;
    let parts: Vec<&str> = values.filter_map(|v| v.to_str().ok()).collect();
    Some(parts.join(", "))
}

impl<B> InboundRequest for http::Request<B> {
    fn connection_address(&self) -> Option<String> {
        self.extensions().get::<RemoteAddr>().map(|addr| addr.0.ip().to_string())
    }

    fn header_line(&self, name: &HeaderName) -> Option<String> {
        header_line(self.headers(), name)
    }
}

impl InboundRequest for http::request::Parts {
    fn connection_address(&self) -> Option<String> {
        self.extensions.get::<RemoteAddr>().map(|addr| addr.0.ip().to_string())
    }

    fn header_line(&self, name: &HeaderName) -> Option<String> {
        header_line(&self.headers, name)
    }
}

/// Parse `candidate` as an IPv4 or IPv6 address.
pub fn parse_ip(candidate: &str) -> Option<IpAddr> {
    candidate.parse::<IpAddr>().ok()
}

/// Whether `candidate` is a syntactically valid IPv4 or IPv6 address.
pub fn is_valid_ip(candidate: &str) -> bool {
    parse_ip(candidate).is_some()
}

/// Resolves a client address from a prioritized list of trusted headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResolver {
    trusted_headers: Vec<HeaderName>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self { trusted_headers: vec![HeaderName::from_static(DEFAULT_TRUSTED_HEADER)] }
    }
}

impl IdentityResolver {
    /// Trust `headers`, highest priority first. An empty list means only the
    /// peer address is ever used.
    pub fn new(headers: impl IntoIterator<Item = HeaderName>) -> Self {
        Self { trusted_headers: headers.into_iter().collect() }
    }

    pub fn trusted_headers(&self) -> &[HeaderName] {
        &self.trusted_headers
    }

    /// Resolve a client address.
    ///
    /// The peer address is the starting candidate if it parses. The first
    /// trusted header present whose leftmost comma-separated token parses
    /// overrides it, and scanning stops there. Returns `None` when nothing
    /// yields a valid address.
    pub fn resolve<F>(&self, connection_address: Option<&str>, header_line: F) -> Option<IpAddr>
    where
        F: Fn(&HeaderName) -> Option<String>,
    {
        let mut candidate = connection_address.and_then(parse_ip);

        for name in &self.trusted_headers {
            let Some(line) = header_line(name) else {
                continue;
            };
            let first = line.split(',').next().unwrap_or_default().trim();
            if let Some(ip) = parse_ip(first) {
                tracing::debug!(header = %name, client_ip = %ip, "client address taken from trusted header");
                candidate = Some(ip);
                break;
            }
        }

        candidate
    }

    /// Resolve the client address of an HTTP request.
    pub fn resolve_request<R: InboundRequest + ?Sized>(&self, request: &R) -> Option<IpAddr> {
        let peer = request.connection_address();
        self.resolve(peer.as_deref(), |name| request.header_line(name))
    }
}
