mod common;

use common::test_helpers::{init_tracing, request_from, CountingHandler, FlakyStore};
use tollgate::rate_limit::headers::{LIMIT_HEADER, REMAINING_HEADER};
use tollgate::{
    Accountant, IdentityResolver, InMemoryCounterStore, ManualClock, RateLimitLayer,
    RateLimitSettings, Window, WindowLimits,
};
use tower::limit::ConcurrencyLimitLayer;
use tower::{Layer, Service, ServiceExt};

fn layer_with(limits: WindowLimits) -> (RateLimitLayer<InMemoryCounterStore>, ManualClock) {
    let clock = ManualClock::new(1_700_000_000);
    let store = InMemoryCounterStore::new().with_clock(clock.clone());
    let layer = RateLimitLayer::new(Accountant::new(store).with_clock(clock.clone())).with_limits(limits);
    (layer, clock)
}

#[tokio::test]
async fn per_second_window_rejects_the_burst_and_skips_the_handler() {
    init_tracing();
    let (layer, clock) = layer_with(WindowLimits::standard(6000, 200, 2));
    let handler = CountingHandler::default();
    let svc = layer.layer(handler.clone());

    for _ in 0..2 {
        let response = svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.unwrap();
        assert_eq!(response.into_body(), "ok");
    }
    let err = svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.unwrap_err();
    let exceeded = err.rate_limited().expect("rate limited");
    assert_eq!(exceeded.key, "10.0.0.1:requests:second:");
    assert_eq!(exceeded.threshold, 2);
    assert_eq!(handler.calls(), 2);

    clock.advance(1);
    assert!(svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.is_ok());
    assert_eq!(handler.calls(), 3);
}

#[tokio::test]
async fn clients_are_counted_separately() {
    let (layer, _) = layer_with(WindowLimits::custom([Window::minute(1)]));
    let svc = layer.layer(CountingHandler::default());

    assert!(svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.is_ok());
    assert!(svc.clone().oneshot(request_from("10.0.0.2:4000", None)).await.is_ok());
    assert!(svc.clone().oneshot(request_from("10.0.0.1:4001", None)).await.unwrap_err().is_rate_limited());
}

#[tokio::test]
async fn forwarded_clients_behind_one_proxy_are_distinguished() {
    let (layer, _) = layer_with(WindowLimits::custom([Window::minute(1)]));
    let svc = layer.layer(CountingHandler::default());

    let a = request_from("192.168.1.1:80", Some("203.0.113.5, 192.168.1.1"));
    let b = request_from("192.168.1.1:80", Some("198.51.100.7"));
    assert!(svc.clone().oneshot(a).await.is_ok());
    assert!(svc.clone().oneshot(b).await.is_ok());

    let store = layer.accountant().store();
    assert_eq!(store.count("203.0.113.5:requests:minute:"), Some(1));
    assert_eq!(store.count("198.51.100.7:requests:minute:"), Some(1));
    assert_eq!(store.count("192.168.1.1:requests:minute:"), None);
}

#[tokio::test]
async fn headers_report_the_tightest_window() {
    let (layer, _) = layer_with(WindowLimits::standard(100, 10, 5));
    let svc = layer.with_rate_limit_headers(true).layer(CountingHandler::default());

    svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.unwrap();
    let response = svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.unwrap();

    assert_eq!(response.headers().get(LIMIT_HEADER).unwrap(), "5");
    assert_eq!(response.headers().get(REMAINING_HEADER).unwrap(), "3");
}

#[tokio::test]
async fn headers_are_absent_by_default() {
    let (layer, _) = layer_with(WindowLimits::default());
    let svc = layer.layer(CountingHandler::default());

    let response = svc.oneshot(request_from("10.0.0.1:4000", None)).await.unwrap();
    assert!(response.headers().get(LIMIT_HEADER).is_none());
    assert!(response.headers().get(REMAINING_HEADER).is_none());
}

#[tokio::test]
async fn rejection_carries_headers_when_enabled() {
    let (layer, _) = layer_with(WindowLimits::custom([Window::minute(1)]));
    let svc = layer.with_rate_limit_headers(true).layer(CountingHandler::default());

    svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.unwrap();
    let err = svc.oneshot(request_from("10.0.0.1:4000", None)).await.unwrap_err();
    let headers = err.rate_limited().and_then(|e| e.headers).expect("headers on rejection");
    assert_eq!((headers.limit, headers.remaining), (1, 0));
}

#[tokio::test]
async fn disabled_windows_admit_everything() {
    let (layer, _) = layer_with(WindowLimits::disabled());
    let handler = CountingHandler::default();
    let svc = layer.layer(handler.clone());

    for _ in 0..50 {
        assert!(svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.is_ok());
    }
    assert_eq!(handler.calls(), 50);
    assert!(layer.accountant().store().is_empty());
}

#[tokio::test]
async fn unresolved_clients_share_one_bucket() {
    let (layer, _) = layer_with(WindowLimits::custom([Window::minute(1)]));
    let svc = layer
        .with_resolver(IdentityResolver::new(Vec::<http::HeaderName>::new()))
        .layer(CountingHandler::default());

    let anonymous = || http::Request::builder().body(()).unwrap();
    assert!(svc.clone().oneshot(anonymous()).await.is_ok());
    assert!(svc.clone().oneshot(anonymous()).await.unwrap_err().is_rate_limited());
}

#[tokio::test]
async fn store_outage_lets_requests_through() {
    let store = FlakyStore::default();
    store.fail_increment(true);
    let layer = RateLimitLayer::new(Accountant::new(store))
        .with_limits(WindowLimits::custom([Window::second(1)]));
    let handler = CountingHandler::default();
    let svc = layer.layer(handler.clone());

    for _ in 0..10 {
        assert!(svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.is_ok());
    }
    assert_eq!(handler.calls(), 10);
}

#[tokio::test]
async fn arming_failure_rejects_before_the_handler() {
    let store = FlakyStore::default();
    store.fail_expire(true);
    let layer = RateLimitLayer::new(Accountant::new(store));
    let handler = CountingHandler::default();
    let svc = layer.layer(handler.clone());

    let err = svc.oneshot(request_from("10.0.0.1:4000", None)).await.unwrap_err();
    assert!(err.is_store());
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn settings_drive_windows_and_trusted_headers() {
    let settings = RateLimitSettings {
        hourly_request_limit: 0,
        minute_request_limit: 0,
        second_request_limit: 1,
        trusted_header_names: vec!["X-Real-IP".into()],
        emit_headers: true,
        ..Default::default()
    };
    let store = InMemoryCounterStore::with_prefix(settings.prefix.clone());
    let layer = RateLimitLayer::from_settings(Accountant::new(store), &settings).unwrap();
    assert_eq!(layer.limits().get().windows(), &[Window::second(1)]);

    let mut req = request_from("10.0.0.1:4000", Some("203.0.113.5"));
    req.headers_mut().insert("x-real-ip", http::HeaderValue::from_static("198.51.100.7"));
    let response = layer.layer(CountingHandler::default()).oneshot(req).await.unwrap();

    assert_eq!(response.headers().get(LIMIT_HEADER).unwrap(), "1");
    assert_eq!(layer.accountant().store().count("198.51.100.7:requests:second:"), Some(1));
}

#[tokio::test]
async fn invalid_settings_are_refused() {
    let settings = RateLimitSettings {
        trusted_header_names: vec!["not a header".into()],
        ..Default::default()
    };
    let result = RateLimitLayer::from_settings(Accountant::new(InMemoryCounterStore::new()), &settings);
    assert!(result.is_err());
}

#[tokio::test]
async fn limits_can_be_retuned_while_serving() {
    let (layer, _) = layer_with(WindowLimits::custom([Window::minute(1)]));
    let svc = layer.layer(CountingHandler::default());

    svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.unwrap();
    assert!(svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.is_err());

    layer.limits().update(|_| WindowLimits::custom([Window::minute(5)]));
    assert!(svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.is_ok());
}

#[tokio::test]
async fn flushing_counters_readmits_a_blocked_client() {
    let (layer, _) = layer_with(WindowLimits::custom([Window::minute(1)]));
    let svc = layer.layer(CountingHandler::default());

    svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.unwrap();
    assert!(svc.clone().oneshot(request_from("10.0.0.1:4000", None)).await.is_err());

    assert_eq!(layer.accountant().flush_by_lookup("10.0.0.1:*").await.unwrap(), 1);
    assert!(svc.oneshot(request_from("10.0.0.1:4000", None)).await.is_ok());
}

#[tokio::test]
async fn readied_inner_instance_serves_the_call() {
    let (layer, _) = layer_with(WindowLimits::custom([Window::minute(10)]));
    let handler = CountingHandler::default();
    let limited = ConcurrencyLimitLayer::new(1).layer(handler.clone());
    let mut svc = layer.layer(limited);

    for _ in 0..3 {
        let ready = ServiceExt::<http::Request<()>>::ready(&mut svc).await.unwrap();
        let response = ready.call(request_from("10.0.0.1:4000", None)).await.unwrap();
        assert_eq!(response.into_body(), "ok");
    }
    assert_eq!(handler.calls(), 3);
}
