use async_trait::async_trait;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tollgate::{CounterStore, InMemoryCounterStore, ManualClock, RemoteAddr, StoreError};
use tower::Service;

/// In-memory store whose individual commands can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    pub inner: InMemoryCounterStore,
    fail_increment: Arc<AtomicBool>,
    fail_expire: Arc<AtomicBool>,
    expire_calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn with_clock(clock: ManualClock) -> Self {
        Self { inner: InMemoryCounterStore::new().with_clock(clock), ..Default::default() }
    }

    pub fn fail_increment(&self, fail: bool) {
        self.fail_increment.store(fail, Ordering::SeqCst);
    }

    pub fn fail_expire(&self, fail: bool) {
        self.fail_expire.store(fail, Ordering::SeqCst);
    }

    pub fn expire_calls(&self) -> usize {
        self.expire_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for FlakyStore {
    fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    async fn increment_by(&self, key: &str, amount: u64) -> Result<u64, StoreError> {
        if self.fail_increment.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.increment_by(key, amount).await
    }

    async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<(), StoreError> {
        self.expire_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_expire.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.expire_at(key, unix_secs).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys_matching(pattern).await
    }

    async fn delete_all(&self, keys: &[String]) -> Result<(), StoreError> {
        self.inner.delete_all(keys).await
    }
}

/// Handler that answers 200 and counts how often it ran.
#[derive(Debug, Clone, Default)]
pub struct CountingHandler {
    pub calls: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Service<http::Request<()>> for CountingHandler {
    type Response = http::Response<&'static str>;
    type Error = Infallible;
    type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: http::Request<()>) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(http::Response::new("ok")))
    }
}

/// Request arriving from `peer`, optionally through a proxy header.
pub fn request_from(peer: &str, forwarded_for: Option<&str>) -> http::Request<()> {
    let mut builder = http::Request::builder().uri("/");
    if let Some(chain) = forwarded_for {
        builder = builder.header("x-forwarded-for", chain);
    }
    let mut req = builder.body(()).expect("valid request");
    req.extensions_mut().insert(RemoteAddr(peer.parse().expect("valid socket address")));
    req
}

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
