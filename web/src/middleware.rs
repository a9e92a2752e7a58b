//! Correlation-id middleware.
//!
//! Every request is tagged with a [`CorrelationId`] taken from the
//! `X-Correlation-ID` header (or minted as a UUID v4), handled inside an
//! `http_request` span carrying it, and answered with the same id in the
//! response header.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/v1/weddings", get(list_weddings))
//!     .layer(correlation_id_layer());
//! ```

use crate::extractors::CorrelationId;
use axum::{extract::Request, http::HeaderValue, response::Response};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Tag requests with a correlation id.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// [`Layer`] producing [`CorrelationIdService`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdService { inner }
    }
}

/// Wraps an inner service with correlation tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdService<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let id = CorrelationId::from_header(req.headers().get(CORRELATION_ID_HEADER));
        req.extensions_mut().insert(id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %id,
            method = %req.method(),
            path = %req.uri().path(),
            status = tracing::field::Empty,
            user_id = tracing::field::Empty,
        );
        let started = Instant::now();
        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let mut response = fut.await?;
                let status = response.status().as_u16();
                tracing::Span::current().record("status", status);
                tracing::debug!(
                    status,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Request finished"
                );

                if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
                    response.headers_mut().insert(CORRELATION_ID_HEADER, value);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}
