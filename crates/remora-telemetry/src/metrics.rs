//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges relevant to a polling RPC client.

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{MetricStage, Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the client.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    rpc_requests_total: IntCounterVec,
    polls_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    tracked_torrents: IntGauge,
    poll_fail_count: IntGauge,
    connected: IntGauge,
}

/// Snapshot of selected gauges for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Torrents currently held in the reconciled catalog.
    pub tracked_torrents: i64,
    /// Consecutive failed polls.
    pub poll_fail_count: i64,
    /// `1` while a session is connected.
    pub connected: i64,
    /// Successful polls observed.
    pub polls_succeeded: u64,
    /// Failed polls observed.
    pub polls_failed: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let rpc_requests_total = IntCounterVec::new(
            Opts::new("rpc_requests_total", "RPC requests issued by method and outcome"),
            &["method", "outcome"],
        )
        .map_err(|source| collector_error("rpc_requests_total", source))?;
        let polls_total = IntCounterVec::new(
            Opts::new("polls_total", "Torrent-list polls by outcome"),
            &["outcome"],
        )
        .map_err(|source| collector_error("polls_total", source))?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Client events emitted by type"),
            &["type"],
        )
        .map_err(|source| collector_error("events_emitted_total", source))?;
        let tracked_torrents = IntGauge::with_opts(Opts::new(
            "tracked_torrents",
            "Torrents held in the reconciled catalog",
        ))
        .map_err(|source| collector_error("tracked_torrents", source))?;
        let poll_fail_count = IntGauge::with_opts(Opts::new(
            "poll_fail_count",
            "Consecutive failed torrent-list polls",
        ))
        .map_err(|source| collector_error("poll_fail_count", source))?;
        let connected = IntGauge::with_opts(Opts::new(
            "connected",
            "Whether a daemon session is connected",
        ))
        .map_err(|source| collector_error("connected", source))?;

        register(&registry, "rpc_requests_total", &rpc_requests_total)?;
        register(&registry, "polls_total", &polls_total)?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "tracked_torrents", &tracked_torrents)?;
        register(&registry, "poll_fail_count", &poll_fail_count)?;
        register(&registry, "connected", &connected)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                rpc_requests_total,
                polls_total,
                events_emitted_total,
                tracked_torrents,
                poll_fail_count,
                connected,
            }),
        })
    }

    /// Count an RPC request for `method` with the given outcome label.
    pub fn inc_rpc_request(&self, method: &str, outcome: &str) {
        self.inner
            .rpc_requests_total
            .with_label_values(&[method, outcome])
            .inc();
    }

    /// Count a poll; `succeeded` selects the outcome label.
    pub fn inc_poll(&self, succeeded: bool) {
        let outcome = if succeeded { "success" } else { "failure" };
        self.inner.polls_total.with_label_values(&[outcome]).inc();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Set the tracked torrent gauge.
    pub fn set_tracked_torrents(&self, count: usize) {
        self.inner
            .tracked_torrents
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Set the consecutive poll failure gauge.
    pub fn set_poll_fail_count(&self, count: u8) {
        self.inner.poll_fail_count.set(i64::from(count));
    }

    /// Flip the connection gauge.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.set(i64::from(connected));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsRender { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tracked_torrents: self.inner.tracked_torrents.get(),
            poll_fail_count: self.inner.poll_fail_count.get(),
            connected: self.inner.connected.get(),
            polls_succeeded: self.inner.polls_total.with_label_values(&["success"]).get(),
            polls_failed: self.inner.polls_total.with_label_values(&["failure"]).get(),
        }
    }
}

fn collector_error(name: &'static str, source: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricSetup {
        name,
        stage: MetricStage::Build,
        source,
    }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricSetup {
            name,
            stage: MetricStage::Register,
            source,
        })
}
