//! Request execution.
//!
//! [`RoundTrip`] executes one HTTP request and returns one response or error.
//! [`HttpTransport`] is the base implementation; the layers in
//! [`instrumented`] wrap any `RoundTrip` with metrics.

mod error;
mod http;
pub mod instrumented;

pub use self::http::{HttpTransport, TransportConfig};
pub use error::TransportError;
pub use instrumented::InstrumentedTransport;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::Full;
use hyper::{Request, Response};
use std::sync::Arc;

/// Request body sent by the client.
pub type Body = Full<Bytes>;

/// Response body handed back to the caller.
pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// Executes one HTTP request.
#[async_trait]
pub trait RoundTrip: Send + Sync {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError>;
}

#[async_trait]
impl<T: RoundTrip + ?Sized> RoundTrip for Arc<T> {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        (**self).round_trip(req).await
    }
}

#[async_trait]
impl<T: RoundTrip + ?Sized> RoundTrip for Box<T> {
    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        (**self).round_trip(req).await
    }
}
