//! Transport errors.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// A request failed before a response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),

    #[error("invalid request URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    #[error("failed to resolve '{host}': {source}")]
    Dns {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("'{host}' resolved to no addresses")]
    NoAddresses { host: String },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with '{host}' failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{phase} timed out after {}", human(.timeout))]
    Timeout {
        phase: &'static str,
        timeout: Duration,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
}

fn human(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}
