//! Tower layer for rate limiting in Axum.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header::HeaderName, HeaderValue, Request, Response, StatusCode},
};
use tower::{Layer, Service};
use tracing::error;

use crate::decision::Decision;
use crate::engine::{Descriptor, Limiter};
use crate::headers::RateLimitHeaders;
use crate::storage::Storage;

/// Header the authenticated user identifier is read from.
const DEFAULT_USER_HEADER: &str = "x-user-id";

/// Tower layer wrapping services with the rate limiting engine.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use gatelimit::{Limiter, MemoryStorage, PolicyConfig};
/// use gatelimit::middleware::RateLimitLayer;
///
/// let config = PolicyConfig::from_file("ratelimit.yaml")?;
/// let limiter = Arc::new(Limiter::from_config(&config, MemoryStorage::new())?);
///
/// let app = axum::Router::new()
///     .route("/api/data", get(handler))
///     .layer(RateLimitLayer::new(limiter));
/// ```
pub struct RateLimitLayer<S> {
    limiter: Arc<Limiter<S>>,
    user_header: String,
    fail_open: bool,
}

impl<S> RateLimitLayer<S> {
    /// Create a new rate limit layer around a shared engine.
    pub fn new(limiter: Arc<Limiter<S>>) -> Self {
        Self {
            limiter,
            user_header: DEFAULT_USER_HEADER.to_string(),
            fail_open: false,
        }
    }

    /// Read the authenticated user from a different header.
    pub fn with_user_header(mut self, header: impl Into<String>) -> Self {
        self.user_header = header.into().to_lowercase();
        self
    }

    /// Admit requests when the storage backend errors instead of
    /// returning 500.
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }
}

impl<S> Clone for RateLimitLayer<S> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            user_header: self.user_header.clone(),
            fail_open: self.fail_open,
        }
    }
}

impl<S, Inner> Layer<Inner> for RateLimitLayer<S> {
    type Service = RateLimitService<S, Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            user_header: self.user_header.clone(),
            fail_open: self.fail_open,
        }
    }
}

/// The rate limiting service produced by [`RateLimitLayer`].
pub struct RateLimitService<S, Inner> {
    inner: Inner,
    limiter: Arc<Limiter<S>>,
    user_header: String,
    fail_open: bool,
}

impl<S, Inner: Clone> Clone for RateLimitService<S, Inner> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            user_header: self.user_header.clone(),
            fail_open: self.fail_open,
        }
    }
}

impl<S, Inner> Service<Request<Body>> for RateLimitService<S, Inner>
where
    S: Storage,
    Inner: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    Inner::Future: Send,
{
    type Response = Response<Body>;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let user_header = self.user_header.clone();
        let fail_open = self.fail_open;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = request.uri().path().to_string();
            let method = request.method().as_str().to_string();
            let ip = client_ip(&request).unwrap_or_default();
            let user = header_value(&request, &user_header).unwrap_or_default();

            let descriptor = Descriptor::new(&path, &method, &ip, &user);
            match limiter.check(descriptor).await {
                Ok(decision) if decision.is_allowed() => {
                    let mut response = inner.call(request).await?;
                    apply_headers(&mut response, &decision);
                    Ok(response)
                }
                Ok(decision) => Ok(too_many_requests(&decision)),
                Err(err) if fail_open => {
                    error!(error = %err, "rate limit check failed, admitting");
                    inner.call(request).await
                }
                Err(err) => {
                    error!(error = %err, "rate limit check failed");
                    let mut response = Response::new(Body::empty());
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    Ok(response)
                }
            }
        })
    }
}

fn header_value(request: &Request<Body>, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Client address from `X-Forwarded-For` (first entry) or `X-Real-IP`.
fn client_ip(request: &Request<Body>) -> Option<String> {
    if let Some(forwarded) = header_value(request, "x-forwarded-for") {
        let first = forwarded.split(',').next()?.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    header_value(request, "x-real-ip")
}

fn apply_headers(response: &mut Response<Body>, decision: &Decision) {
    let headers = response.headers_mut();
    for (name, value) in RateLimitHeaders::from(decision).to_vec() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            headers.insert(name, value);
        }
    }
}

fn too_many_requests(decision: &Decision) -> Response<Body> {
    let body = format!(
        r#"{{"error":"Too Many Requests","retry_after":{},"remaining":{},"limit":{}}}"#,
        decision.retry_after, decision.remaining, decision.limit
    );

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response.headers_mut().insert(
        HeaderName::from_static("content-type"),
        HeaderValue::from_static("application/json"),
    );
    apply_headers(&mut response, decision);

    response
}
