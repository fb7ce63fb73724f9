use http::header::HeaderName;
use std::net::IpAddr;
use tollgate::{IdentityResolver, RateLimitRequest, RemoteAddr};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn forwarded_header_overrides_the_proxy_address() {
    let resolver = IdentityResolver::default();
    let resolved = resolver.resolve(Some("192.168.1.1"), |_| Some("203.0.113.5, 192.168.1.1".into()));
    assert_eq!(resolved, Some(ip("203.0.113.5")));
}

#[test]
fn garbage_everywhere_yields_no_identity() {
    let resolver = IdentityResolver::default();
    assert_eq!(resolver.resolve(Some("unix:/tmp/sock"), |_| Some("unknown".into())), None);
}

#[test]
fn header_names_match_case_insensitively() {
    let mut req = http::Request::builder()
        .header("X-Forwarded-For", "2001:db8::1")
        .body(())
        .unwrap();
    req.extensions_mut().insert(RemoteAddr("10.0.0.1:443".parse().unwrap()));

    let resolver = IdentityResolver::new([HeaderName::from_static("x-forwarded-for")]);
    assert_eq!(resolver.resolve_request(&req), Some(ip("2001:db8::1")));
}

#[test]
fn request_parts_resolve_like_full_requests() {
    let mut req = http::Request::builder()
        .header("x-real-ip", "198.51.100.20")
        .body(())
        .unwrap();
    req.extensions_mut().insert(RemoteAddr("10.0.0.1:443".parse().unwrap()));
    let (parts, ()) = req.into_parts();

    let resolver = IdentityResolver::new([HeaderName::from_static("x-real-ip")]);
    assert_eq!(resolver.resolve_request(&parts), Some(ip("198.51.100.20")));
}

#[test]
fn resolved_addresses_are_escaped_in_keys() {
    let resolver = IdentityResolver::default();
    let mut req = http::Request::new(());
    req.extensions_mut().insert(RemoteAddr("[::1]:8080".parse().unwrap()));

    let request = RateLimitRequest::new()
        .with_client_identity(&resolver, &req)
        .with_name("requests")
        .with_name("second");
    assert_eq!(request.key(), "\\:\\:1:requests:second:");
}

#[test]
fn unresolved_identity_renders_an_empty_segment() {
    let resolver = IdentityResolver::default();
    let req = http::Request::new(());
    let request = RateLimitRequest::new().with_client_identity(&resolver, &req).with_name("login");
    assert_eq!(request.key(), ":login:");
}
