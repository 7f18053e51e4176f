//! Client metrics collector using prometheus-client.
//!
//! Holds the five client metrics: a request counter, an in-flight gauge, an
//! unlabeled request duration histogram and event-labeled DNS and TLS phase
//! histograms.

use crate::metrics::lint::{
    CLIENT_METRICS, DNS_DURATION, IN_FLIGHT_REQUESTS, REQUEST_DURATION, REQUESTS, TLS_DURATION,
};
use crate::metrics::registry::{DuplicateRegistrationError, MetricRegistry};
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::{Family, MetricConstructor};
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Default histogram buckets, in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// `code` label value recorded when the transport fails without a response.
pub const FAILURE_CODE: &str = "error";

/// Labels for the request counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub code: String,
    pub method: String,
}

/// Labels for the DNS and TLS phase histograms.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PhaseLabels {
    pub event: PhaseEvent,
}

/// Connection phase a trace event belongs to.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Phase {
    Dns,
    Tls,
}

/// Lifecycle event reported by the transport.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum PhaseEvent {
    DnsStart,
    DnsDone,
    TlsHandshakeStart,
    TlsHandshakeDone,
}

impl PhaseEvent {
    /// Label value for this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseEvent::DnsStart => "dns_start",
            PhaseEvent::DnsDone => "dns_done",
            PhaseEvent::TlsHandshakeStart => "tls_handshake_start",
            PhaseEvent::TlsHandshakeDone => "tls_handshake_done",
        }
    }

    /// Histogram the event is recorded in.
    pub fn phase(&self) -> Phase {
        match self {
            PhaseEvent::DnsStart | PhaseEvent::DnsDone => Phase::Dns,
            PhaseEvent::TlsHandshakeStart | PhaseEvent::TlsHandshakeDone => Phase::Tls,
        }
    }
}

impl EncodeLabelValue for PhaseEvent {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        encoder.write_str(self.as_str())
    }
}

/// Bucket layout shared by every histogram of one collector.
#[derive(Clone, Debug)]
pub struct BucketLayout(Arc<[f64]>);

impl BucketLayout {
    pub fn new(buckets: &[f64]) -> Self {
        Self(buckets.into())
    }

    pub fn buckets(&self) -> &[f64] {
        &self.0
    }

    fn histogram(&self) -> Histogram {
        Histogram::new(self.0.iter().copied())
    }
}

impl Default for BucketLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKETS)
    }
}

impl MetricConstructor<Histogram> for BucketLayout {
    fn new_metric(&self) -> Histogram {
        self.histogram()
    }
}

type PhaseHistogram = Family<PhaseLabels, Histogram, BucketLayout>;

/// Collects and stores the client metrics.
///
/// Cloning is cheap; every clone updates the same aggregates.
#[derive(Clone, Debug)]
pub struct ClientMetrics {
    inner: Arc<ClientMetricsInner>,
}

#[derive(Debug)]
struct ClientMetricsInner {
    /// Completed requests by status code and method.
    requests_total: Family<RequestLabels, Counter>,
    /// Requests dispatched but not yet completed.
    in_flight: Gauge,
    /// Total request duration (in seconds).
    request_duration_seconds: Histogram,
    /// Time since request start at each DNS event.
    dns_duration_seconds: PhaseHistogram,
    /// Time since request start at each TLS handshake event.
    tls_duration_seconds: PhaseHistogram,
    buckets: BucketLayout,
}

impl ClientMetrics {
    /// Create a collector using [`DEFAULT_BUCKETS`].
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// Create a collector whose three histograms use `buckets`.
    pub fn with_buckets(buckets: &[f64]) -> Self {
        let buckets = BucketLayout::new(buckets);

        Self {
            inner: Arc::new(ClientMetricsInner {
                requests_total: Family::default(),
                in_flight: Gauge::default(),
                request_duration_seconds: buckets.histogram(),
                dns_duration_seconds: Family::new_with_constructor(buckets.clone()),
                tls_duration_seconds: Family::new_with_constructor(buckets.clone()),
                buckets,
            }),
        }
    }

    /// Register all five metrics with `registry`.
    ///
    /// Either every metric is registered or, on a name collision, none is.
    pub fn register(
        &self,
        registry: &mut MetricRegistry,
    ) -> Result<(), DuplicateRegistrationError> {
        registry.ensure_available(CLIENT_METRICS)?;

        let inner = &self.inner;
        registry.register(&REQUESTS, inner.requests_total.clone())?;
        registry.register(&IN_FLIGHT_REQUESTS, inner.in_flight.clone())?;
        registry.register(&REQUEST_DURATION, inner.request_duration_seconds.clone())?;
        registry.register(&DNS_DURATION, inner.dns_duration_seconds.clone())?;
        registry.register(&TLS_DURATION, inner.tls_duration_seconds.clone())?;

        debug!(metrics = CLIENT_METRICS.len(), "registered client metrics");
        Ok(())
    }

    /// Count one completed request.
    pub fn observe_request_completed(&self, code: &str, method: &str) {
        let labels = RequestLabels {
            code: code.to_string(),
            method: method.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();
    }

    /// Adjust the in-flight gauge by `delta`.
    pub fn observe_in_flight_delta(&self, delta: i64) {
        if delta >= 0 {
            self.inner.in_flight.inc_by(delta);
        } else {
            self.inner.in_flight.dec_by(-delta);
        }
    }

    /// Mark a request in flight until the returned guard is dropped.
    pub fn track_in_flight(&self) -> InFlightGuard {
        self.observe_in_flight_delta(1);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    /// Record a phase event `elapsed_seconds` after request start.
    ///
    /// Negative or non-finite values are clamped to zero.
    pub fn observe_phase(&self, event: PhaseEvent, elapsed_seconds: f64) {
        let elapsed = clamp_elapsed(elapsed_seconds);
        let labels = PhaseLabels { event };
        let family = match event.phase() {
            Phase::Dns => &self.inner.dns_duration_seconds,
            Phase::Tls => &self.inner.tls_duration_seconds,
        };
        family.get_or_create(&labels).observe(elapsed);
    }

    /// Record the total duration of one request.
    pub fn observe_duration(&self, elapsed_seconds: f64) {
        self.inner
            .request_duration_seconds
            .observe(clamp_elapsed(elapsed_seconds));
    }

    /// Start timing a request. The duration is recorded when the guard drops.
    pub fn start_request_timer(&self) -> RequestTimer {
        RequestTimer {
            metrics: self.clone(),
            start: Instant::now(),
        }
    }

    /// Current value of the in-flight gauge.
    pub fn in_flight(&self) -> i64 {
        self.inner.in_flight.get()
    }

    /// Bucket layout used by the histograms.
    pub fn buckets(&self) -> &[f64] {
        self.inner.buckets.buckets()
    }
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_elapsed(elapsed_seconds: f64) -> f64 {
    if elapsed_seconds.is_finite() && elapsed_seconds >= 0.0 {
        elapsed_seconds
    } else {
        debug!(elapsed_seconds, "clamping invalid elapsed time to zero");
        0.0
    }
}

/// Decrements the in-flight gauge on drop.
#[must_use = "the request stops counting as in flight when the guard is dropped"]
pub struct InFlightGuard {
    metrics: ClientMetrics,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.observe_in_flight_delta(-1);
    }
}

/// Timer guard that records request duration on drop.
#[must_use = "the duration is recorded when the timer is dropped"]
pub struct RequestTimer {
    metrics: ClientMetrics,
    start: Instant,
}

impl RequestTimer {
    /// Get the elapsed duration.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.metrics
            .observe_duration(self.start.elapsed().as_secs_f64());
    }
}
