//! Client surface and the instrumented client factory.

mod factory;

pub use factory::{
    instrument_client, new_instrumented_client, new_instrumented_client_with, InstrumentedClient,
};

use crate::config::ClientConfig;
use crate::transport::{Body, HttpTransport, ResponseBody, RoundTrip, TransportError};
use async_trait::async_trait;
use hyper::{Request, Response};
use std::sync::Arc;

/// An HTTP client executing requests through a [`RoundTrip`].
///
/// Instrumented and plain clients have the same type; instrumentation only
/// changes the transport underneath.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn RoundTrip>,
}

impl Client {
    /// Create a client on top of `transport`.
    pub fn new(transport: impl RoundTrip + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Create a plain client using [`HttpTransport`] with the given timeouts.
    pub fn with_config(config: &ClientConfig) -> Self {
        Self::new(HttpTransport::new(config.transport_config()))
    }

    /// Execute a request.
    pub async fn request(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        self.transport.round_trip(req).await
    }

    /// Issue a `GET` with an empty body.
    pub async fn get(&self, uri: &str) -> Result<Response<ResponseBody>, TransportError> {
        let req = Request::get(uri).body(Body::default())?;
        self.request(req).await
    }

    /// The transport requests go through.
    pub fn transport(&self) -> Arc<dyn RoundTrip> {
        Arc::clone(&self.transport)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(HttpTransport::default())
    }
}

#[async_trait]
impl RoundTrip for Client {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        self.request(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_rejects_malformed_uri() {
        let client = Client::default();
        let err = client.get("http://exa mple.com/").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_get_rejects_relative_uri() {
        let client = Client::default();
        let err = client.get("/relative").await.unwrap_err();
        assert!(
            matches!(err, TransportError::InvalidUri { reason: "missing scheme", .. }),
            "{err:?}"
        );
    }
}
