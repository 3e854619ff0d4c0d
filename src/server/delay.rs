//! Uniform request delay middleware
//!
//! Holds every matched request for a fixed duration before it reaches the
//! handler. The layer is only installed when a non-zero delay is configured,
//! so the zero case costs nothing.

use std::time::Duration;

use axum::extract::Request;
use axum::response::Response;
use tower::Layer;

/// Delay layer applying a fixed hold to each request
#[derive(Clone)]
pub struct DelayLayer {
    delay: Duration,
}

impl DelayLayer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl<S> Layer<S> for DelayLayer {
    type Service = DelayMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DelayMiddleware {
            inner,
            delay: self.delay,
        }
    }
}

/// The actual middleware service
#[derive(Clone)]
pub struct DelayMiddleware<S> {
    inner: S,
    delay: Duration,
}

impl<S> tower::Service<Request> for DelayMiddleware<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let delay = self.delay;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            tokio::time::sleep(delay).await;
            inner.call(req).await
        })
    }
}
