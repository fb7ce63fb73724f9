use crate::config::{ConfigError, RateLimitSettings};
use crate::dynamic::DynamicConfig;
use crate::error::InterceptError;
use crate::identity::IdentityResolver;
use crate::rate_limit::accountant::Accountant;
use crate::rate_limit::headers::RateLimitHeaders;
use crate::rate_limit::request::RateLimitRequest;
use crate::rate_limit::store::CounterStore;
use crate::rate_limit::window::{WindowLimits, REQUESTS};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that checks every request against a set of fixed windows.
///
/// Each window is keyed `<client-ip>:requests:<window>:`. Windows are
/// checked in order before the inner service runs; the first one exceeded
/// rejects the request with [`InterceptError::RateLimited`].
#[derive(Debug)]
pub struct RateLimitLayer<S> {
    accountant: Accountant<S>,
    resolver: Arc<IdentityResolver>,
    limits: DynamicConfig<WindowLimits>,
    emit_headers: bool,
}

impl<S> Clone for RateLimitLayer<S> {
    fn clone(&self) -> Self {
        Self {
            accountant: self.accountant.clone(),
            resolver: self.resolver.clone(),
            limits: self.limits.clone(),
            emit_headers: self.emit_headers,
        }
    }
}

impl<S: CounterStore> RateLimitLayer<S> {
    /// Default windows (6000/hour, 200/minute, 20/second), trusting
    /// `X-Forwarded-For`.
    pub fn new(accountant: Accountant<S>) -> Self {
        Self {
            accountant,
            resolver: Arc::new(IdentityResolver::default()),
            limits: DynamicConfig::new(WindowLimits::default()),
            emit_headers: false,
        }
    }

    /// Build from validated settings. The key prefix belongs to the store and
    /// must be applied when constructing it.
    pub fn from_settings(
        accountant: Accountant<S>,
        settings: &RateLimitSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self::new(accountant)
            .with_resolver(settings.identity_resolver()?)
            .with_limits(settings.window_limits())
            .with_rate_limit_headers(settings.emit_headers))
    }

    pub fn with_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_limits(self, limits: WindowLimits) -> Self {
        self.limits.set(limits);
        self
    }

    /// Decorate responses with the headers of the window closest to its limit.
    pub fn with_rate_limit_headers(mut self, emit: bool) -> Self {
        self.emit_headers = emit;
        self
    }

    /// Handle for retuning windows at runtime; services built from this
    /// layer see updates on their next request.
    pub fn limits(&self) -> &DynamicConfig<WindowLimits> {
        &self.limits
    }

    pub fn accountant(&self) -> &Accountant<S> {
        &self.accountant
    }
}

impl<Inner, S> Layer<Inner> for RateLimitLayer<S>
where
    S: CounterStore + 'static,
{
    type Service = RateLimitService<Inner, S>;

    fn layer(&self, service: Inner) -> Self::Service {
        RateLimitService {
            inner: service,
            accountant: self.accountant.clone(),
            resolver: self.resolver.clone(),
            limits: self.limits.clone(),
            emit_headers: self.emit_headers,
        }
    }
}

/// Middleware service that enforces fixed-window limits.
#[derive(Debug)]
pub struct RateLimitService<Inner, S> {
    inner: Inner,
    accountant: Accountant<S>,
    resolver: Arc<IdentityResolver>,
    limits: DynamicConfig<WindowLimits>,
    emit_headers: bool,
}

impl<Inner: Clone, S> Clone for RateLimitService<Inner, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            accountant: self.accountant.clone(),
            resolver: self.resolver.clone(),
            limits: self.limits.clone(),
            emit_headers: self.emit_headers,
        }
    }
}

impl<Inner, S, ReqBody, ResBody> Service<http::Request<ReqBody>> for RateLimitService<Inner, S>
where
    Inner: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    Inner::Future: Send + 'static,
    Inner::Error: Send + 'static,
    S: CounterStore + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = InterceptError<Inner::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(InterceptError::Inner)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let accountant = self.accountant.clone();
        let limits = self.limits.get();
        let emit_headers = self.emit_headers;
        // Only the instance polled by `poll_ready` may be called; keep a fresh
        // clone for the next request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let client_ip = self.resolver.resolve_request(&req);
        if client_ip.is_none() {
            tracing::debug!("no client address resolved, sharing the anonymous bucket");
        }

        Box::pin(async move {
            let mut tightest: Option<RateLimitHeaders> = None;

            for window in limits.windows() {
                let request = RateLimitRequest::new()
                    .with_client_ip(client_ip)
                    .with_name(REQUESTS)
                    .with_name(window.name.as_str())
                    .with_time_interval(window.interval_seconds)
                    .with_rate_limit_headers(emit_headers);

                let admission = accountant.limit(&request, window.threshold, 1).await?;
                if let Some(headers) = admission.headers {
                    if tightest.map_or(true, |t| headers.remaining < t.remaining) {
                        tightest = Some(headers);
                    }
                }
            }

            let response = inner.call(req).await.map_err(InterceptError::Inner)?;
            Ok(match tightest {
                Some(headers) => headers.decorate(response),
                None => response,
            })
        })
    }
}
