//! Request logging middleware (tower Layer + Service).
//!
//! Every request gets one line with peer, status and elapsed time. Responses
//! of the metrics handler carry a [`ScrapeSummary`] extension, so scrape lines
//! also say how many checks were seen and how many outage fetches failed.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::{ConnectInfo, Request};
use axum::response::Response;
use tracing::{debug, info, warn};

use pingdom_core::ScrapeSummary;

#[derive(Clone)]
pub(crate) struct AccessLogLayer;

impl<S> tower::Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone)]
pub(crate) struct AccessLogService<S> {
    inner: S,
}

fn peer(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "-".to_owned(), |ConnectInfo(addr)| addr.ip().to_string())
}

fn log_response(peer: &str, route: &str, response: &Response, elapsed_ms: u64) {
    let status = response.status().as_u16();
    match response.extensions().get::<ScrapeSummary>() {
        Some(scrape) if !scrape.up || scrape.outage_failures > 0 => warn!(
            peer,
            status,
            elapsed_ms,
            up = scrape.up,
            checks = scrape.checks,
            ignored = scrape.ignored,
            outage_failures = scrape.outage_failures,
            "{route} (incomplete scrape)"
        ),
        Some(scrape) => info!(
            peer,
            status,
            elapsed_ms,
            checks = scrape.checks,
            ignored = scrape.ignored,
            "{route}"
        ),
        // Liveness polling is noisy at info.
        None if route.ends_with(" /health") => debug!(peer, status, elapsed_ms, "{route}"),
        None => info!(peer, status, elapsed_ms, "{route}"),
    }
}

impl<S> tower::Service<Request> for AccessLogService<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let route = format!("{} {}", req.method(), req.uri().path());
        let peer = peer(&req);
        let started = Instant::now();

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(req).await?;
            log_response(&peer, &route, &response, started.elapsed().as_millis() as u64);
            Ok(response)
        })
    }
}
