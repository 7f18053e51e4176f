//! Instrumented client construction.

use crate::client::Client;
use crate::config::ClientConfig;
use crate::metrics::{ClientMetrics, DuplicateRegistrationError, MetricRegistry};
use crate::trace::PhaseTracer;
use crate::transport::{Body, InstrumentedTransport, ResponseBody, RoundTrip, TransportError};
use async_trait::async_trait;
use hyper::{Request, Response};
use tracing::{debug, warn};

/// A client whose requests are recorded in [`ClientMetrics`].
///
/// Issues requests exactly like [`Client`], and keeps a handle to the
/// metrics it reports into.
#[derive(Clone)]
pub struct InstrumentedClient {
    client: Client,
    metrics: ClientMetrics,
}

impl InstrumentedClient {
    /// The instrumented client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The metrics every request is recorded in.
    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Give up the metrics handle and keep only the client.
    pub fn into_client(self) -> Client {
        self.client
    }

    /// Execute a request.
    pub async fn request(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        self.client.request(req).await
    }

    /// Issue a `GET` with an empty body.
    pub async fn get(&self, uri: &str) -> Result<Response<ResponseBody>, TransportError> {
        self.client.get(uri).await
    }
}

#[async_trait]
impl RoundTrip for InstrumentedClient {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        self.client.request(req).await
    }
}

/// Create an instrumented client with default settings.
///
/// Registers the client metrics with `registry`; fails if any of them is
/// already registered there.
pub fn new_instrumented_client(
    registry: &mut MetricRegistry,
) -> Result<InstrumentedClient, DuplicateRegistrationError> {
    new_instrumented_client_with(&ClientConfig::default(), registry)
}

/// Create an instrumented client from `config`.
pub fn new_instrumented_client_with(
    config: &ClientConfig,
    registry: &mut MetricRegistry,
) -> Result<InstrumentedClient, DuplicateRegistrationError> {
    instrument_client(Client::with_config(config), config, registry)
}

/// Wrap an existing client's transport with metrics bucketed per `config`.
pub fn instrument_client(
    client: Client,
    config: &ClientConfig,
    registry: &mut MetricRegistry,
) -> Result<InstrumentedClient, DuplicateRegistrationError> {
    let metrics = ClientMetrics::with_buckets(config.buckets());
    if let Err(e) = metrics.register(registry) {
        warn!(error = %e, "failed to register client metrics");
        return Err(e);
    }

    let tracer = PhaseTracer::new(metrics.clone());
    let transport = InstrumentedTransport::new(client.transport(), metrics.clone(), tracer);
    debug!("instrumented http client ready");

    Ok(InstrumentedClient {
        client: Client::new(transport),
        metrics,
    })
}
