//! Correlation-id tracking.
//!
//! Every request runs inside an `http_request` span carrying a correlation
//! id, taken from the `X-Correlation-ID` header when it holds a UUID and
//! generated otherwise. The id is stored in the request extensions and echoed
//! in the response header.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use rsvp_web::middleware::correlation_id_layer;
//!
//! let app = Router::new()
//!     .route("/api/events", get(list_events))
//!     .layer(correlation_id_layer());
//! ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{HeaderMap, HeaderValue, request::Parts},
    response::Response,
};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Layer that tags every request with a [`CorrelationId`].
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Copy, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Service produced by [`CorrelationIdLayer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

type ResponseFuture<E> = Pin<Box<dyn Future<Output = Result<Response, E>> + Send>>;

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let id = CorrelationId::from_headers(req.headers());
        req.extensions_mut().insert(id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %id.0,
            method = %req.method(),
            path = %req.uri().path(),
        );
        let echo = HeaderValue::from_str(&id.0.to_string()).ok();
        let pending = self.inner.call(req);

        Box::pin(async move {
            let mut response = pending.instrument(span).await?;
            if let Some(value) = echo {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}

/// Correlation ID of the current request.
///
/// Reads the id stored by [`correlation_id_layer`]; without the layer a fresh
/// id is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// The caller's id when the header holds a UUID, a fresh one otherwise.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let supplied = headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok());
        Self(supplied.unwrap_or_else(Uuid::new_v4))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .copied()
            .unwrap_or_else(|| Self::from_headers(&parts.headers)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .route(
                "/echo",
                get(|CorrelationId(id): CorrelationId| async move { id.to_string() }),
            )
            .layer(correlation_id_layer())
    }

    fn echoed(response: &Response) -> String {
        response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_correlation_id_generated_if_missing() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert!(Uuid::parse_str(&echoed(&response)).is_ok());
    }

    #[tokio::test]
    async fn test_correlation_id_preserved_from_request() {
        let request_uuid = Uuid::new_v4();
        let request = Request::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, request_uuid.to_string())
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(echoed(&response), request_uuid.to_string());
    }

    #[tokio::test]
    async fn test_handlers_see_the_same_id() {
        let request = Request::builder().uri("/echo").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        let echoed = echoed(&response);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), echoed);
    }

    #[tokio::test]
    async fn test_invalid_uuid_generates_new() {
        let request = Request::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        let id = echoed(&response);
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, "not-a-uuid");
    }
}
