//! Per-scrape collection pass.
//!
//! One scrape fetches the check list once, emits the per-check status and tag
//! samples, then fans out one task per check to fetch its outage summary and
//! emit the aggregation samples. All tasks are joined before `collect`
//! returns. Fan-out is one task per non-ignored check unless
//! `max_concurrent_fetches` is configured.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::aggregation::aggregate;
use crate::api::{CheckFilter, ChecksApi, OutageApi};
use crate::config::ExporterConfig;
use crate::model::{Check, OutageWindow};
use crate::sink::{Descriptors, MetricSink};
use crate::tags::{TagPolicy, parse_tag_label};

/// Outcome of one scrape, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Whether the check list was fetched.
    pub up: bool,
    pub checks: usize,
    pub ignored: usize,
    pub outage_failures: usize,
}

pub struct Collector<A> {
    api: Arc<A>,
    config: Arc<ExporterConfig>,
    descriptors: Arc<Descriptors>,
}

impl<A> Collector<A>
where
    A: ChecksApi + OutageApi + 'static,
{
    pub fn new(api: Arc<A>, config: ExporterConfig) -> Self {
        let descriptors = Arc::new(Descriptors::new(&config.tag_policy));
        Self {
            api,
            config: Arc::new(config),
            descriptors,
        }
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    /// Runs one scrape with the window ending now.
    pub async fn collect<S: MetricSink + 'static>(&self, sink: Arc<S>) -> ScrapeSummary {
        self.collect_at(chrono::Utc::now().timestamp(), sink).await
    }

    /// Runs one scrape with the window ending at `now` (epoch seconds).
    pub async fn collect_at<S: MetricSink + 'static>(&self, now: i64, sink: Arc<S>) -> ScrapeSummary {
        let t0 = Instant::now();
        let d = &self.descriptors;
        let window = OutageWindow::ending_at(now, self.config.outage_check_period_days);
        let mut summary = ScrapeSummary::default();

        let filter = CheckFilter {
            include_tags: true,
            tags: self.config.tags_filter.clone(),
        };
        let checks = match self.api.list_checks(&filter).await {
            Ok(checks) => checks,
            Err(e) => {
                error!(error = %e, "failed to list checks");
                sink.emit(&d.up, 0.0, &[]);
                return summary;
            }
        };
        summary.up = true;
        sink.emit(&d.up, 1.0, &[]);
        sink.emit(&d.slo_period, window.seconds(), &[]);

        let limit = self
            .config
            .max_concurrent_fetches
            .map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();

        for check in checks {
            if check.has_ignore_tag() {
                summary.ignored += 1;
                continue;
            }
            summary.checks += 1;

            let id = check.id.to_string();
            self.emit_tags(sink.as_ref(), &check, &id);
            self.emit_status(sink.as_ref(), &check, &id);

            let api = self.api.clone();
            let descriptors = self.descriptors.clone();
            let sink = sink.clone();
            let limit = limit.clone();
            let default_slo = self.config.default_uptime_slo;
            tasks.spawn(async move {
                let _permit = match limit {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                let intervals = match api.list_outages(check.id, window).await {
                    Ok(intervals) => intervals,
                    Err(e) => {
                        warn!(check_id = check.id, error = %e, "failed to get outages");
                        return false;
                    }
                };
                let agg = aggregate(&check, &intervals, window.seconds(), default_slo);
                let labels = [id, check.name, check.hostname];
                let d = &descriptors;
                sink.emit(&d.outages, agg.outages, &labels);
                sink.emit(&d.up_seconds, agg.uptime_seconds, &labels);
                sink.emit(&d.down_seconds, agg.downtime_seconds, &labels);
                sink.emit(&d.error_budget, agg.error_budget_seconds, &labels);
                sink.emit(
                    &d.available_error_budget,
                    agg.available_error_budget_seconds,
                    &labels,
                );
                true
            });
        }

        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(true) => {}
                Ok(false) => summary.outage_failures += 1,
                Err(e) => {
                    error!(error = %e, "outage task failed");
                    summary.outage_failures += 1;
                }
            }
        }

        debug!(
            checks = summary.checks,
            ignored = summary.ignored,
            outage_failures = summary.outage_failures,
            duration_ms = t0.elapsed().as_millis() as u64,
            "scrape completed"
        );
        summary
    }

    fn emit_tags<S: MetricSink + ?Sized>(&self, sink: &S, check: &Check, id: &str) {
        let d = &self.descriptors;
        match &self.config.tag_policy {
            TagPolicy::Plain => {
                for tag in check.all_tags() {
                    sink.emit(
                        &d.tags,
                        1.0,
                        &[
                            id.to_string(),
                            tag.name.clone(),
                            tag.kind.clone(),
                            tag.count.to_string(),
                        ],
                    );
                }
            }
            TagPolicy::PerTag(pattern) => {
                for tag in check.all_tags() {
                    let tl = parse_tag_label(&tag.name, pattern);
                    if tl.matched {
                        sink.emit(
                            &d.tags_label,
                            1.0,
                            &[id.to_string(), tl.key, tl.value, tag.name.clone()],
                        );
                    }
                }
            }
            TagPolicy::ExtraLabels { pattern, labels } => {
                let parsed: HashMap<String, String> = check
                    .all_tags()
                    .map(|tag| parse_tag_label(&tag.name, pattern))
                    .filter(|tl| tl.matched)
                    .map(|tl| (tl.key, tl.value))
                    .collect();
                if parsed.is_empty() {
                    return;
                }
                let mut values = Vec::with_capacity(labels.len() + 1);
                values.push(id.to_string());
                values.extend(labels.values_in_order(&parsed));
                sink.emit(&d.tags_label, 1.0, &values);
            }
        }
    }

    fn emit_status<S: MetricSink + ?Sized>(&self, sink: &S, check: &Check, id: &str) {
        let d = &self.descriptors;
        let labels = [
            id.to_string(),
            check.name.clone(),
            check.hostname.clone(),
            check.resolution.to_string(),
            check.is_paused().to_string(),
        ];
        let status = if check.is_up() { 1.0 } else { 0.0 };
        sink.emit(&d.status, status, &labels);
        sink.emit(&d.response_time, check.response_time_seconds(), &labels);
    }
}
