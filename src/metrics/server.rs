//! Prometheus metrics HTTP server.
//!
//! Serves a [`MetricRegistry`] on a configurable HTTP endpoint.

use crate::metrics::MetricRegistry;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Prometheus metrics HTTP server.
pub struct MetricsServer {
    listener: TcpListener,
    path: Arc<str>,
    registry: Arc<MetricRegistry>,
}

impl MetricsServer {
    /// Bind the metrics server.
    pub async fn bind(
        address: SocketAddr,
        path: &str,
        registry: Arc<MetricRegistry>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            path: path.into(),
            registry,
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve scrapes until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            address = ?self.listener.local_addr().ok(),
            path = %self.path,
            "metrics server started"
        );

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let registry = Arc::clone(&self.registry);
                            let path = Arc::clone(&self.path);

                            tokio::spawn(async move {
                                let service = service_fn(move |req| {
                                    let response = handle_request(&req, &registry, &path);
                                    async move { Ok::<_, Infallible>(response) }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await
                                {
                                    debug!(error = %e, "metrics connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept metrics connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("metrics server shutting down");
                    break;
                }
            }
        }
    }
}

/// Route a scrape request.
fn handle_request<B>(
    req: &Request<B>,
    registry: &MetricRegistry,
    metrics_path: &str,
) -> Response<Full<Bytes>> {
    let path = req.uri().path();
    debug!(path = %path, method = %req.method(), "metrics request");

    if req.method() != Method::GET {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n");
    }

    if path == metrics_path {
        match registry.encode() {
            Ok(buffer) => Response::builder()
                .header(hyper::header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)
                .body(Full::new(Bytes::from(buffer)))
                .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "")),
            Err(e) => {
                error!(error = %e, "failed to encode metrics");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics\n")
            }
        }
    } else if path == "/health" || path == "/healthz" {
        text_response(StatusCode::OK, "OK\n")
    } else {
        text_response(StatusCode::NOT_FOUND, "Not found\n")
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
