//! Instrumentation layers.
//!
//! Each layer wraps the next [`RoundTrip`] and adds one observable concern
//! around its full execution. [`InstrumentedTransport`] composes them,
//! outermost first:
//!
//! 1. [`InFlightLayer`]: in-flight gauge, released by a drop guard.
//! 2. [`CounterLayer`]: request counter by status code and method.
//! 3. [`TraceLayer`]: attaches a [`RequestTrace`] for DNS/TLS phase hooks.
//! 4. [`DurationLayer`]: request duration, recorded by a drop guard.
//!
//! Every layer delegates exactly once and hands the inner result back
//! unchanged.

use crate::metrics::{ClientMetrics, FAILURE_CODE};
use crate::trace::{PhaseTracer, RequestTrace};
use crate::transport::{Body, ResponseBody, RoundTrip, TransportError};
use async_trait::async_trait;
use hyper::{Request, Response};
use tracing::trace;

/// Tracks the request in the in-flight gauge.
pub struct InFlightLayer {
    metrics: ClientMetrics,
    inner: Box<dyn RoundTrip>,
}

impl InFlightLayer {
    pub fn new(metrics: ClientMetrics, inner: impl RoundTrip + 'static) -> Self {
        Self {
            metrics,
            inner: Box::new(inner),
        }
    }
}

#[async_trait]
impl RoundTrip for InFlightLayer {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let _in_flight = self.metrics.track_in_flight();
        self.inner.round_trip(req).await
    }
}

/// Counts completed requests by status code and method.
///
/// Transport failures are counted under [`FAILURE_CODE`].
pub struct CounterLayer {
    metrics: ClientMetrics,
    inner: Box<dyn RoundTrip>,
}

impl CounterLayer {
    pub fn new(metrics: ClientMetrics, inner: impl RoundTrip + 'static) -> Self {
        Self {
            metrics,
            inner: Box::new(inner),
        }
    }
}

#[async_trait]
impl RoundTrip for CounterLayer {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let method = req.method().clone();
        let result = self.inner.round_trip(req).await;

        match &result {
            Ok(response) => {
                self.metrics
                    .observe_request_completed(response.status().as_str(), method.as_str());
            }
            Err(e) => {
                trace!(method = %method, error = %e, "counting failed request");
                self.metrics
                    .observe_request_completed(FAILURE_CODE, method.as_str());
            }
        }
        result
    }
}

/// Attaches phase hooks to the outgoing request.
pub struct TraceLayer {
    tracer: PhaseTracer,
    inner: Box<dyn RoundTrip>,
}

impl TraceLayer {
    pub fn new(tracer: PhaseTracer, inner: impl RoundTrip + 'static) -> Self {
        Self {
            tracer,
            inner: Box::new(inner),
        }
    }
}

#[async_trait]
impl RoundTrip for TraceLayer {
    async fn round_trip(
        &self,
        mut req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        RequestTrace::new(self.tracer.clone()).attach(&mut req);
        self.inner.round_trip(req).await
    }
}

/// Records the total request duration.
pub struct DurationLayer {
    metrics: ClientMetrics,
    inner: Box<dyn RoundTrip>,
}

impl DurationLayer {
    pub fn new(metrics: ClientMetrics, inner: impl RoundTrip + 'static) -> Self {
        Self {
            metrics,
            inner: Box::new(inner),
        }
    }
}

#[async_trait]
impl RoundTrip for DurationLayer {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let _timer = self.metrics.start_request_timer();
        self.inner.round_trip(req).await
    }
}

/// A base transport wrapped in all four instrumentation layers.
pub struct InstrumentedTransport {
    metrics: ClientMetrics,
    chain: InFlightLayer,
}

impl InstrumentedTransport {
    pub fn new(
        base: impl RoundTrip + 'static,
        metrics: ClientMetrics,
        tracer: PhaseTracer,
    ) -> Self {
        let duration = DurationLayer::new(metrics.clone(), base);
        let traced = TraceLayer::new(tracer, duration);
        let counted = CounterLayer::new(metrics.clone(), traced);
        let chain = InFlightLayer::new(metrics.clone(), counted);

        Self { metrics, chain }
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }
}

#[async_trait]
impl RoundTrip for InstrumentedTransport {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        self.chain.round_trip(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricRegistry;
    use bytes::Bytes;
    use futures::FutureExt;
    use http_body_util::{BodyExt, Full};
    use hyper::StatusCode;
    use std::io;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What the fake transport saw while handling a request.
    #[derive(Debug, Default)]
    struct Observed {
        calls: AtomicUsize,
        in_flight: Mutex<Vec<i64>>,
        traced: Mutex<Vec<bool>>,
    }

    enum Outcome {
        Status(StatusCode),
        Refused,
        Hang,
        Panic,
    }

    /// Transport double that fires DNS hooks and answers with a fixed outcome.
    struct FakeTransport {
        metrics: ClientMetrics,
        outcome: Outcome,
        observed: Arc<Observed>,
    }

    #[async_trait]
    impl RoundTrip for FakeTransport {
        async fn round_trip(
            &self,
            req: Request<Body>,
        ) -> Result<Response<ResponseBody>, TransportError> {
            self.observed.calls.fetch_add(1, Ordering::SeqCst);
            self.observed
                .in_flight
                .lock()
                .unwrap()
                .push(self.metrics.in_flight());

            let trace = RequestTrace::from_request(&req);
            self.observed.traced.lock().unwrap().push(trace.is_some());
            if let Some(trace) = trace {
                trace.dns_start();
                trace.dns_done();
            }

            match self.outcome {
                Outcome::Status(status) => {
                    let body = Full::new(Bytes::from_static(b"hello"))
                        .map_err(|never| match never {})
                        .boxed();
                    let mut response = Response::new(body);
                    *response.status_mut() = status;
                    Ok(response)
                }
                Outcome::Refused => Err(TransportError::Connect {
                    addr: "127.0.0.1:1".parse().unwrap(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                }),
                Outcome::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Outcome::Panic => panic!("transport blew up mid-request"),
            }
        }
    }

    fn setup(outcome: Outcome) -> (InstrumentedTransport, MetricRegistry, Arc<Observed>) {
        let metrics = ClientMetrics::new();
        let mut registry = MetricRegistry::new();
        metrics.register(&mut registry).unwrap();

        let observed = Arc::new(Observed::default());
        let base = FakeTransport {
            metrics: metrics.clone(),
            outcome,
            observed: Arc::clone(&observed),
        };
        let tracer = PhaseTracer::new(metrics.clone());
        (InstrumentedTransport::new(base, metrics, tracer), registry, observed)
    }

    fn get() -> Request<Body> {
        Request::get("http://example.com/").body(Body::default()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_request() {
        let (transport, registry, observed) = setup(Outcome::Status(StatusCode::OK));

        let response = transport.round_trip(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");

        assert_eq!(observed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*observed.in_flight.lock().unwrap(), vec![1]);
        assert_eq!(*observed.traced.lock().unwrap(), vec![true]);
        assert_eq!(transport.metrics().in_flight(), 0);

        let buffer = registry.encode().unwrap();
        assert!(buffer.contains(r#"client_requests_total{code="200",method="GET"} 1"#));
        assert!(buffer.contains("client_request_duration_seconds_count 1"));
        assert!(buffer.contains(r#"dns_duration_seconds_count{event="dns_start"} 1"#));
        assert!(buffer.contains(r#"dns_duration_seconds_count{event="dns_done"} 1"#));
        assert!(!buffer.contains("tls_duration_seconds_count"));
    }

    #[tokio::test]
    async fn test_error_status_is_counted_by_code() {
        let (transport, registry, _) = setup(Outcome::Status(StatusCode::SERVICE_UNAVAILABLE));

        let req = Request::post("http://example.com/submit")
            .body(Body::from("payload"))
            .unwrap();
        let response = transport.round_trip(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let buffer = registry.encode().unwrap();
        assert!(buffer.contains(r#"client_requests_total{code="503",method="POST"} 1"#));
    }

    #[tokio::test]
    async fn test_transport_error_is_recorded_and_passed_through() {
        let (transport, registry, observed) = setup(Outcome::Refused);

        let err = transport.round_trip(get()).await.unwrap_err();
        match err {
            TransportError::Connect { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused)
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(observed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.metrics().in_flight(), 0);

        let buffer = registry.encode().unwrap();
        assert!(buffer.contains(r#"client_requests_total{code="error",method="GET"} 1"#));
        assert!(buffer.contains("client_request_duration_seconds_count 1"));
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_in_flight() {
        let (transport, registry, observed) = setup(Outcome::Hang);

        let result =
            tokio::time::timeout(Duration::from_millis(20), transport.round_trip(get())).await;
        assert!(result.is_err());

        assert_eq!(observed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.metrics().in_flight(), 0);

        let buffer = registry.encode().unwrap();
        assert!(buffer.contains("client_request_duration_seconds_count 1"));
        assert!(!buffer.contains("client_requests_total{"));
    }

    #[tokio::test]
    async fn test_panicking_transport_releases_in_flight() {
        let (transport, registry, observed) = setup(Outcome::Panic);

        let result = AssertUnwindSafe(transport.round_trip(get()))
            .catch_unwind()
            .await;
        assert!(result.is_err());

        assert_eq!(observed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*observed.in_flight.lock().unwrap(), vec![1]);
        assert_eq!(transport.metrics().in_flight(), 0);

        let buffer = registry.encode().unwrap();
        assert!(buffer.contains("client_request_duration_seconds_count 1"));
        // No outcome to label, so the counter stays empty.
        assert!(!buffer.contains("client_requests_total{"));
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let (transport, registry, observed) = setup(Outcome::Status(StatusCode::OK));
        let transport = Arc::new(transport);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..50 {
            let transport = Arc::clone(&transport);
            tasks.spawn(async move { transport.round_trip(get()).await.map(|r| r.status()) });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().unwrap(), StatusCode::OK);
        }

        assert_eq!(observed.calls.load(Ordering::SeqCst), 50);
        assert_eq!(transport.metrics().in_flight(), 0);

        let buffer = registry.encode().unwrap();
        assert!(buffer.contains(r#"client_requests_total{code="200",method="GET"} 50"#));
        assert!(buffer.contains("client_request_duration_seconds_count 50"));
    }

    #[tokio::test]
    async fn test_trace_layer_alone_attaches_context() {
        let metrics = ClientMetrics::new();
        let observed = Arc::new(Observed::default());
        let base = FakeTransport {
            metrics: metrics.clone(),
            outcome: Outcome::Status(StatusCode::NO_CONTENT),
            observed: Arc::clone(&observed),
        };

        let layer = TraceLayer::new(PhaseTracer::new(metrics.clone()), base);
        layer.round_trip(get()).await.unwrap();

        assert_eq!(*observed.traced.lock().unwrap(), vec![true]);
        // Without the in-flight layer nothing touches the gauge.
        assert_eq!(*observed.in_flight.lock().unwrap(), vec![0]);
    }
}
