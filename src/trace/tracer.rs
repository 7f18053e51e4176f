//! Phase timing hooks.

use crate::metrics::{ClientMetrics, PhaseEvent};

/// Hooks for the DNS and TLS lifecycle events.
///
/// Each hook takes the seconds elapsed since the request started and records
/// them under its event name. Hooks are independent: a request on an IP
/// literal fires no DNS hooks, a plain-text request fires no TLS hooks.
#[derive(Clone, Debug)]
pub struct PhaseTracer {
    metrics: ClientMetrics,
}

impl PhaseTracer {
    pub fn new(metrics: ClientMetrics) -> Self {
        Self { metrics }
    }

    pub fn on_dns_start(&self, elapsed_seconds: f64) {
        self.on_event(PhaseEvent::DnsStart, elapsed_seconds);
    }

    pub fn on_dns_done(&self, elapsed_seconds: f64) {
        self.on_event(PhaseEvent::DnsDone, elapsed_seconds);
    }

    pub fn on_tls_handshake_start(&self, elapsed_seconds: f64) {
        self.on_event(PhaseEvent::TlsHandshakeStart, elapsed_seconds);
    }

    pub fn on_tls_handshake_done(&self, elapsed_seconds: f64) {
        self.on_event(PhaseEvent::TlsHandshakeDone, elapsed_seconds);
    }

    /// Record `event` at `elapsed_seconds`.
    pub fn on_event(&self, event: PhaseEvent, elapsed_seconds: f64) {
        self.metrics.observe_phase(event, elapsed_seconds);
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricRegistry;

    #[test]
    fn test_hooks_use_their_event_names() {
        let metrics = ClientMetrics::new();
        let mut registry = MetricRegistry::new();
        metrics.register(&mut registry).unwrap();

        let tracer = PhaseTracer::new(metrics);
        tracer.on_dns_start(0.0);
        tracer.on_dns_done(0.002);
        tracer.on_tls_handshake_start(0.003);
        tracer.on_tls_handshake_done(0.04);

        let buffer = registry.encode().unwrap();
        for (metric, event) in [
            ("dns_duration_seconds", "dns_start"),
            ("dns_duration_seconds", "dns_done"),
            ("tls_duration_seconds", "tls_handshake_start"),
            ("tls_duration_seconds", "tls_handshake_done"),
        ] {
            let series = format!("{metric}_count{{event=\"{event}\"}} 1");
            assert!(buffer.contains(&series), "missing {series}");
        }
    }
}
