//! httpmeter - Prometheus instrumentation for outbound HTTP clients
//!
//! Every request issued through an [`InstrumentedClient`] records:
//! - a request counter labeled by status code and method
//! - an in-flight request gauge
//! - a request duration histogram
//! - DNS and TLS handshake phase timings
//!
//! The instrumentation is a chain of [`RoundTrip`](transport::RoundTrip)
//! decorators around a base transport, so call sites look the same with or
//! without it.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = httpmeter::metrics::MetricRegistry::new();
//! let client = httpmeter::new_instrumented_client(&mut registry)?;
//! let response = client.get("http://example.com/").await?;
//! println!("{} -> {}", response.status(), registry.encode()?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod metrics;
pub mod probe;
pub mod trace;
pub mod transport;
pub mod util;

pub use client::{
    instrument_client, new_instrumented_client, new_instrumented_client_with, Client,
    InstrumentedClient,
};
pub use config::Config;
pub use metrics::{ClientMetrics, DuplicateRegistrationError, MetricRegistry};
pub use transport::{RoundTrip, TransportError};
