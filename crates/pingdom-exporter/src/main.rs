mod access_log;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use pingdom_core::config::TOKEN_ENV;
use pingdom_core::tags::{DEFAULT_TAG_FORMAT, TagPolicy};
use pingdom_core::{Collector, ConfigError, ExporterConfig, PingdomClient};

use access_log::AccessLogLayer;
use state::{ExporterInner, SharedState, process_registry};

// ============================================================
// CLI
// ============================================================

/// Exports Pingdom checks, outages and SLO error budgets as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "pingdom-exporter", version = pingdom_core::VERSION)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 9158, env = "PINGDOM_EXPORTER_PORT")]
    port: u16,

    /// Path under which to expose metrics.
    #[arg(long, default_value = "/metrics")]
    metrics_path: String,

    /// Time (in days) in which to retrieve outage data from the Pingdom API.
    #[arg(long, default_value_t = 7)]
    outage_check_period: u32,

    /// Uptime SLO used when a check has no uptime SLO tag
    /// (uptime_slo_999 means a 99.9% uptime SLO).
    #[arg(long, default_value_t = 99.0)]
    default_uptime_slo: f64,

    /// Pingdom-side tag filter, comma separated.
    #[arg(long, default_value = "")]
    tags: String,

    /// Enable tag parsing based on --tag-format.
    #[arg(long)]
    parser_tags: bool,

    /// Regular expression with two capture groups (key, value) used to parse tags.
    #[arg(long, default_value = DEFAULT_TAG_FORMAT)]
    tag_format: String,

    /// Comma-separated tag keys promoted to `label_*` labels of pingdom_tags_label.
    /// Requires --parser-tags.
    #[arg(long, default_value = "")]
    tag_extra_labels: String,

    /// Timeout for each Pingdom API request, in seconds.
    #[arg(long, default_value_t = 10)]
    api_timeout: u64,

    /// Upper bound on serving one HTTP request, scrape included, in seconds.
    /// Slower requests are answered with 408.
    #[arg(long, default_value_t = 60)]
    request_timeout: u64,

    /// Maximum number of concurrent outage requests per scrape (unbounded if unset).
    #[arg(long)]
    max_concurrent_fetches: Option<usize>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn exporter_config(&self) -> Result<ExporterConfig, ConfigError> {
        if !self.parser_tags && !self.tag_extra_labels.trim().is_empty() {
            warn!("--tag-extra-labels has no effect without --parser-tags");
        }
        let policy =
            TagPolicy::from_settings(self.parser_tags, &self.tag_format, &self.tag_extra_labels)?;
        ExporterConfig::new(
            self.outage_check_period,
            self.default_uptime_slo,
            self.tags.clone(),
            policy,
        )?
        .with_max_concurrent_fetches(self.max_concurrent_fetches)
    }

    fn metrics_path(&self) -> Result<String, ConfigError> {
        let path = if self.metrics_path.starts_with('/') {
            self.metrics_path.clone()
        } else {
            format!("/{}", self.metrics_path)
        };
        if path == "/" || path == "/health" {
            return Err(ConfigError::OutOfRange(format!(
                "metrics path {} conflicts with a built-in route",
                path
            )));
        }
        Ok(path)
    }

    fn request_timeout(&self) -> Result<Duration, ConfigError> {
        if self.request_timeout == 0 {
            return Err(ConfigError::OutOfRange(
                "request timeout must be positive".to_string(),
            ));
        }
        if self.request_timeout <= self.api_timeout {
            warn!(
                request_timeout = self.request_timeout,
                api_timeout = self.api_timeout,
                "request timeout does not exceed the API timeout, slow scrapes will be cut off"
            );
        }
        Ok(Duration::from_secs(self.request_timeout))
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["pingdom_exporter", "pingdom_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn describe_policy(policy: &TagPolicy) -> String {
    match policy {
        TagPolicy::Plain => "plain".to_string(),
        TagPolicy::PerTag(pattern) => format!("per-tag ({})", pattern.as_str()),
        TagPolicy::ExtraLabels { pattern, labels } => format!(
            "extra-labels ({}) [{}]",
            pattern.as_str(),
            labels.label_names().join(", ")
        ),
    }
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let (config, metrics_path, request_timeout) = match args
        .exporter_config()
        .and_then(|config| Ok((config, args.metrics_path()?, args.request_timeout()?)))
    {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid configuration, exiting");
            process::exit(1);
        }
    };

    let token = std::env::var(TOKEN_ENV).unwrap_or_default();
    let client = match PingdomClient::new(token, Duration::from_secs(args.api_timeout)) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "cannot create Pingdom client, exiting");
            process::exit(1);
        }
    };

    info!(
        version = pingdom_core::VERSION,
        outage_check_period_days = config.outage_check_period_days,
        default_uptime_slo = config.default_uptime_slo,
        tags = %config.tags_filter,
        tag_policy = %describe_policy(&config.tag_policy),
        max_concurrent_fetches = ?config.max_concurrent_fetches,
        request_timeout_secs = request_timeout.as_secs(),
        "starting pingdom exporter"
    );

    let process_registry = match process_registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "cannot register process metrics, exiting");
            process::exit(1);
        }
    };
    let state: SharedState = Arc::new(ExporterInner {
        collector: Collector::new(Arc::new(client), config),
        metrics_path,
        process_registry,
    });

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(serve(args.port, state, request_timeout)) {
        error!(error = %e, "server error");
        process::exit(1);
    }
}

fn router(state: SharedState, request_timeout: Duration) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route(&metrics_path, get(handlers::handle_metrics))
        .route("/health", get(handlers::handle_health))
        .route("/", get(handlers::handle_index))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(AccessLogLayer)
        .layer(CompressionLayer::new())
}

async fn serve(port: u16, state: SharedState, request_timeout: Duration) -> std::io::Result<()> {
    let app = router(state, request_timeout).into_make_service_with_connect_info::<SocketAddr>();

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clap::CommandFactory;
    use http_body_util::BodyExt;
    use pingdom_core::ScrapeSummary;
    use tower::ServiceExt;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["pingdom-exporter"]).unwrap();
        assert_eq!(args.port, 9158);
        assert_eq!(args.metrics_path().unwrap(), "/metrics");
        let config = args.exporter_config().unwrap();
        assert_eq!(config.outage_check_period_days, 7);
        assert_eq!(config.default_uptime_slo, 99.0);
        assert!(matches!(config.tag_policy, TagPolicy::Plain));
    }

    #[test]
    fn test_extra_labels_policy() {
        let args = Args::try_parse_from([
            "pingdom-exporter",
            "--parser-tags",
            "--tag-extra-labels",
            "Env, Team-Name",
            "--metrics-path",
            "scrape",
        ])
        .unwrap();
        assert_eq!(args.metrics_path().unwrap(), "/scrape");
        match args.exporter_config().unwrap().tag_policy {
            TagPolicy::ExtraLabels { labels, .. } => {
                assert_eq!(labels.label_names(), vec!["label_env", "label_team_name"]);
            }
            other => panic!("unexpected policy {:?}", other),
        }
    }

    #[test]
    fn test_bad_tag_format_is_config_error() {
        let args =
            Args::try_parse_from(["pingdom-exporter", "--parser-tags", "--tag-format", "(["])
                .unwrap();
        assert!(matches!(
            args.exporter_config(),
            Err(ConfigError::InvalidTagFormat { .. })
        ));
    }

    #[test]
    fn test_metrics_path_conflicts_rejected() {
        for path in ["/", "health"] {
            let args =
                Args::try_parse_from(["pingdom-exporter", "--metrics-path", path]).unwrap();
            assert!(args.metrics_path().is_err(), "{}", path);
        }
    }

    fn test_state(base_url: &str, api_timeout: Duration) -> SharedState {
        let config = ExporterConfig::new(7, 99.0, "", TagPolicy::Plain).unwrap();
        let client = PingdomClient::new("token", api_timeout)
            .unwrap()
            .with_base_url(base_url);
        Arc::new(ExporterInner {
            collector: Collector::new(Arc::new(client), config),
            metrics_path: "/metrics".to_string(),
            process_registry: process_registry().unwrap(),
        })
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&body).into_owned()
    }

    #[test]
    fn test_request_timeout_validation() {
        let args = Args::try_parse_from(["pingdom-exporter"]).unwrap();
        assert_eq!(args.request_timeout().unwrap(), Duration::from_secs(60));

        let args = Args::try_parse_from(["pingdom-exporter", "--request-timeout", "0"]).unwrap();
        assert!(matches!(
            args.request_timeout(),
            Err(ConfigError::OutOfRange(_))
        ));
    }

    #[tokio::test]
    async fn test_router_serves_index_and_health() {
        let app = router(
            test_state("http://127.0.0.1:9", Duration::from_secs(1)),
            Duration::from_secs(30),
        );

        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(body_text(resp).await.contains("href='/metrics'"));

        // Pingdom is unreachable: the scrape reports pingdom_up 0 and nothing else.
        let resp = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let summary = resp.extensions().get::<ScrapeSummary>().copied();
        assert_eq!(summary.map(|s| s.up), Some(false));
        let text = body_text(resp).await;
        assert!(text.contains("pingdom_up 0"));
        assert!(!text.contains("pingdom_slo_period_seconds"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_metrics_include_process_series() {
        let app = router(
            test_state("http://127.0.0.1:9", Duration::from_secs(1)),
            Duration::from_secs(30),
        );
        let resp = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let text = body_text(resp).await;
        assert!(text.contains("pingdom_up 0"));
        assert!(text.contains("# TYPE process_start_time_seconds gauge"));
        assert!(text.contains("process_resident_memory_bytes "));
    }

    #[tokio::test]
    async fn test_slow_scrape_times_out() {
        // Accepts connections but never answers.
        let stalled = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", stalled.local_addr().unwrap());
        let app = router(
            test_state(&base_url, Duration::from_secs(10)),
            Duration::from_millis(200),
        );

        let resp = app
            .clone()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);

        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        drop(stalled);
    }
}
