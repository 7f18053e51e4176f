//! Base HTTP/1.1 transport.
//!
//! Opens one connection per request: resolve, connect, optional TLS, then a
//! hyper HTTP/1.1 exchange. Phase events are reported to the
//! [`RequestTrace`] attached to the request, if there is one.

use crate::trace::RequestTrace;
use crate::transport::{Body, ResponseBody, RoundTrip, TransportError};
use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, trace, warn};

/// Timeouts for the connection phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub dns_timeout: Duration,
    pub tls_handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            dns_timeout: Duration::from_secs(5),
            tls_handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP/1.1 transport over tokio TCP and rustls.
#[derive(Clone)]
pub struct HttpTransport {
    config: TransportConfig,
    tls: TlsConnector,
}

impl HttpTransport {
    /// Create a transport trusting the platform's native root certificates.
    pub fn new(config: TransportConfig) -> Self {
        Self::with_tls_config(config, Arc::new(native_tls_config()))
    }

    /// Create a transport with a caller-supplied rustls configuration.
    pub fn with_tls_config(config: TransportConfig, tls_config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            tls: TlsConnector::from(tls_config),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn resolve(
        &self,
        target: &Target,
        trace: Option<&RequestTrace>,
    ) -> Result<Vec<SocketAddr>, TransportError> {
        if let Ok(ip) = target.host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, target.port)]);
        }

        if let Some(trace) = trace {
            trace.dns_start();
        }
        let result = timeout(
            self.config.dns_timeout,
            lookup_host((target.host.as_str(), target.port)),
        )
        .await;
        if let Some(trace) = trace {
            trace.dns_done();
        }

        let addrs: Vec<SocketAddr> = match result {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(source)) => {
                return Err(TransportError::Dns {
                    host: target.host.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(TransportError::Timeout {
                    phase: "dns resolution",
                    timeout: self.config.dns_timeout,
                });
            }
        };

        trace!(host = %target.host, addresses = addrs.len(), "resolved host");
        if addrs.is_empty() {
            return Err(TransportError::NoAddresses {
                host: target.host.clone(),
            });
        }
        Ok(addrs)
    }

    /// Connect to the first address that accepts.
    async fn connect(
        &self,
        target: &Target,
        addrs: &[SocketAddr],
    ) -> Result<TcpStream, TransportError> {
        let mut last_error = None;

        for &addr in addrs {
            match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    debug!(host = %target.host, address = %addr, "connected");
                    return Ok(stream);
                }
                Ok(Err(source)) => {
                    debug!(address = %addr, error = %source, "connect attempt failed");
                    last_error = Some(TransportError::Connect { addr, source });
                }
                Err(_) => {
                    debug!(address = %addr, "connect attempt timed out");
                    last_error = Some(TransportError::Timeout {
                        phase: "connect",
                        timeout: self.config.connect_timeout,
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| TransportError::NoAddresses {
            host: target.host.clone(),
        }))
    }

    async fn handshake(
        &self,
        target: &Target,
        stream: TcpStream,
        trace: Option<&RequestTrace>,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, TransportError> {
        let server_name = ServerName::try_from(target.host.clone()).map_err(|e| {
            TransportError::Tls {
                host: target.host.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, e),
            }
        })?;

        if let Some(trace) = trace {
            trace.tls_handshake_start();
        }
        let result = timeout(
            self.config.tls_handshake_timeout,
            self.tls.connect(server_name, stream),
        )
        .await;
        if let Some(trace) = trace {
            trace.tls_handshake_done();
        }

        match result {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(TransportError::Tls {
                host: target.host.clone(),
                source,
            }),
            Err(_) => Err(TransportError::Timeout {
                phase: "tls handshake",
                timeout: self.config.tls_handshake_timeout,
            }),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[async_trait]
impl RoundTrip for HttpTransport {
    async fn round_trip(
        &self,
        mut req: Request<Body>,
    ) -> Result<Response<ResponseBody>, TransportError> {
        let target = Target::from_uri(req.uri())?;
        let trace = RequestTrace::from_request(&req).cloned();
        into_origin_form(&mut req)?;

        let addrs = self.resolve(&target, trace.as_ref()).await?;
        let stream = self.connect(&target, &addrs).await?;

        if target.tls {
            let stream = self.handshake(&target, stream, trace.as_ref()).await?;
            send(stream, req).await
        } else {
            send(stream, req).await
        }
    }
}

/// Where a request goes.
#[derive(Debug, PartialEq, Eq)]
struct Target {
    /// Host name or IP literal, without IPv6 brackets.
    host: String,
    port: u16,
    tls: bool,
}

impl Target {
    fn from_uri(uri: &Uri) -> Result<Self, TransportError> {
        let invalid = |reason: &'static str| TransportError::InvalidUri {
            uri: uri.to_string(),
            reason,
        };

        let tls = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            Some(_) => return Err(invalid("unsupported scheme")),
            None => return Err(invalid("missing scheme")),
        };
        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

/// Fill in `Host` and rewrite the URI to origin form for HTTP/1.1.
fn into_origin_form(req: &mut Request<Body>) -> Result<(), TransportError> {
    let uri = req.uri().clone();
    let invalid = |reason: &'static str| TransportError::InvalidUri {
        uri: uri.to_string(),
        reason,
    };

    if !req.headers().contains_key(HOST) {
        let host = uri.host().ok_or_else(|| invalid("missing host"))?;
        let value = match uri.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let value = HeaderValue::from_str(&value).map_err(|_| invalid("invalid host"))?;
        req.headers_mut().insert(HOST, value);
    }

    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    *req.uri_mut() = path_and_query
        .parse()
        .map_err(|_| invalid("invalid path"))?;
    Ok(())
}

async fn send<IO>(io: IO, req: Request<Body>) -> Result<Response<ResponseBody>, TransportError>
where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection error");
        }
    });

    let response = sender.send_request(req).await?;
    Ok(response.map(|body| body.boxed()))
}

fn native_tls_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    let native = load_native_roots();
    let (added, ignored) = roots.add_parsable_certificates(native);
    debug!(added, ignored, "loaded native root certificates");

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    config
}

fn load_native_roots() -> Vec<tokio_rustls::rustls::pki_types::CertificateDer<'static>> {
    let result = rustls_native_certs::load_native_certs();
    for error in &result.errors {
        warn!(error = %error, "failed to load native root certificate");
    }
    result.certs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::default()).unwrap()
    }

    #[test]
    fn test_target_defaults_port_by_scheme() {
        let plain = Target::from_uri(&"http://example.com/a".parse().unwrap()).unwrap();
        assert_eq!(
            plain,
            Target {
                host: "example.com".to_string(),
                port: 80,
                tls: false
            }
        );

        let secure = Target::from_uri(&"https://example.com:8443".parse().unwrap()).unwrap();
        assert_eq!(secure.port, 8443);
        assert!(secure.tls);
    }

    #[test]
    fn test_target_strips_ipv6_brackets() {
        let target = Target::from_uri(&"http://[::1]:8080/".parse().unwrap()).unwrap();
        assert_eq!(target.host, "::1");
        assert!(target.host.parse::<IpAddr>().is_ok());
    }

    #[test]
    fn test_target_rejects_bad_uris() {
        for (uri, reason) in [
            ("/relative", "missing scheme"),
            ("ftp://example.com/", "unsupported scheme"),
        ] {
            match Target::from_uri(&uri.parse().unwrap()) {
                Err(TransportError::InvalidUri { reason: r, .. }) => assert_eq!(r, reason),
                other => panic!("unexpected result for {uri}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_origin_form_and_host_header() {
        let mut req = request("http://example.com:8080/search?q=1");
        into_origin_form(&mut req).unwrap();

        assert_eq!(req.uri(), "/search?q=1");
        assert_eq!(req.headers()[HOST], "example.com:8080");
    }

    #[test]
    fn test_origin_form_keeps_explicit_host() {
        let mut req = Request::get("http://10.0.0.1/")
            .header(HOST, "virtual.example")
            .body(Body::default())
            .unwrap();
        into_origin_form(&mut req).unwrap();

        assert_eq!(req.uri(), "/");
        assert_eq!(req.headers()[HOST], "virtual.example");
    }

    #[tokio::test]
    async fn test_ip_literal_skips_resolution() {
        let transport = HttpTransport::default();
        let target = Target::from_uri(&"http://127.0.0.1:9/".parse().unwrap()).unwrap();

        let addrs = transport.resolve(&target, None).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:9".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::default();
        let err = transport
            .round_trip(request(&format!("http://{addr}/")))
            .await
            .unwrap_err();

        assert!(
            matches!(err, TransportError::Connect { addr: a, .. } if a == addr),
            "unexpected error: {err:?}"
        );
    }
}
