//! Per-request trace context.

use crate::metrics::PhaseEvent;
use crate::trace::PhaseTracer;
use hyper::Request;
use std::time::Instant;

/// A tracer bound to the start time of one request.
///
/// Created by the trace layer and attached to the request's extensions; the
/// transport calls the event methods as each phase begins and ends.
#[derive(Clone, Debug)]
pub struct RequestTrace {
    tracer: PhaseTracer,
    start: Instant,
}

impl RequestTrace {
    /// Bind `tracer` to a request starting now.
    pub fn new(tracer: PhaseTracer) -> Self {
        Self::starting_at(tracer, Instant::now())
    }

    pub fn starting_at(tracer: PhaseTracer, start: Instant) -> Self {
        Self { tracer, start }
    }

    /// The trace attached to `req`, if any.
    pub fn from_request<B>(req: &Request<B>) -> Option<&RequestTrace> {
        req.extensions().get::<RequestTrace>()
    }

    /// Attach this trace to `req`, replacing any previous one.
    pub fn attach<B>(self, req: &mut Request<B>) {
        req.extensions_mut().insert(self);
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    /// Seconds since the request started. `Instant` is monotonic and
    /// saturates, so this is never negative.
    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn dns_start(&self) {
        self.fire(PhaseEvent::DnsStart);
    }

    pub fn dns_done(&self) {
        self.fire(PhaseEvent::DnsDone);
    }

    pub fn tls_handshake_start(&self) {
        self.fire(PhaseEvent::TlsHandshakeStart);
    }

    pub fn tls_handshake_done(&self) {
        self.fire(PhaseEvent::TlsHandshakeDone);
    }

    fn fire(&self, event: PhaseEvent) {
        self.tracer.on_event(event, self.elapsed_seconds());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ClientMetrics, MetricRegistry};
    use std::time::Duration;

    #[test]
    fn test_attach_and_lookup() {
        let tracer = PhaseTracer::new(ClientMetrics::new());
        let mut req = Request::get("http://example.com/").body(()).unwrap();
        assert!(RequestTrace::from_request(&req).is_none());

        let trace = RequestTrace::new(tracer);
        let start = trace.start();
        trace.attach(&mut req);

        let attached = RequestTrace::from_request(&req).unwrap();
        assert_eq!(attached.start(), start);
    }

    #[test]
    fn test_elapsed_is_measured_from_start() {
        let metrics = ClientMetrics::new();
        let mut registry = MetricRegistry::new();
        metrics.register(&mut registry).unwrap();

        let start = Instant::now() - Duration::from_millis(30);
        let trace = RequestTrace::starting_at(PhaseTracer::new(metrics), start);
        assert!(trace.elapsed_seconds() >= 0.03);

        trace.dns_done();

        // 30ms falls in the 0.05 bucket but not the 0.025 one.
        let buffer = registry.encode().unwrap();
        let bucket = buffer
            .lines()
            .find(|line| {
                line.starts_with("dns_duration_seconds_bucket") && line.contains(r#"le="0.025""#)
            })
            .unwrap();
        assert!(bucket.ends_with(" 0"), "{bucket}");
        assert!(buffer.contains(r#"dns_duration_seconds_count{event="dns_done"} 1"#));
    }
}
