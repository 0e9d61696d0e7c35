//! HTTP request handlers: metrics exposition, landing page, health.

use std::sync::Arc;

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

use pingdom_core::{RegistrySink, ScrapeSummary};

use crate::state::AppState;

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

pub(crate) async fn handle_index(axum::extract::State(state): AppState) -> Html<String> {
    Html(landing_page(&state.metrics_path))
}

fn landing_page(metrics_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>Pingdom Exporter</title></head>\n\
         <body>\n\
         <h1>Pingdom Exporter</h1>\n\
         <p><a href='{}'>Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        metrics_path
    )
}

/// Runs one scrape against Pingdom and renders it in the text format, along
/// with the process metrics. The [`ScrapeSummary`] rides along as a response
/// extension for the access log.
pub(crate) async fn handle_metrics(axum::extract::State(state): AppState) -> Response {
    let sink = match RegistrySink::new(state.collector.descriptors()) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!(error = %e, "failed to build metric registry");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let summary = state.collector.collect(sink.clone()).await;

    match sink.render_with(state.process_registry.gather()) {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            axum::Extension::<ScrapeSummary>(summary),
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
