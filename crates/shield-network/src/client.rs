//! HTTP Client
//!
//! Uses hyper with tokio for async HTTP/1.1.
//! Features:
//! - Automatic HTTPS with rustls (memory-safe TLS)
//! - Connect and whole-request timeouts
//! - Response body size limit

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, HeaderValue, HOST, USER_AGENT};
use hyper::{Request, StatusCode, Uri};
use rustls::ClientConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    Protocol(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Body read error: {0}")]
    BodyError(String),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout (connect + exchange + body)
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("shield/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: 4 * 1024 * 1024, // 4 MB
        }
    }
}

/// HTTP response wrapper
#[derive(Debug)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Time to first byte
    pub ttfb: Duration,
}

impl Response {
    /// Check if response was successful (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Client statistics
#[derive(Debug, Default)]
pub struct ClientStats {
    pub requests_made: AtomicU64,
    pub requests_failed: AtomicU64,
    pub bytes_downloaded: AtomicU64,
}

/// HTTP/1.1 client
pub struct HttpClient {
    /// Configuration
    config: HttpClientConfig,
    /// TLS connector shared by all HTTPS requests
    tls: TlsConnector,
    /// Statistics
    stats: ClientStats,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Self {
        info!(
            "HTTP client initialized (timeout: {:?}, connect timeout: {:?})",
            config.timeout, config.connect_timeout
        );

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
            stats: ClientStats::default(),
        }
    }

    /// Send a prepared request
    ///
    /// The request URI must be absolute. `Host` and `User-Agent` are
    /// filled in when missing.
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response, HttpError> {
        self.stats.requests_made.fetch_add(1, Ordering::Relaxed);

        let result = match tokio::time::timeout(self.config.timeout, self.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout),
        };

        if result.is_err() {
            self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn execute(&self, request: Request<Full<Bytes>>) -> Result<Response, HttpError> {
        // 1. Resolve target from the absolute URI
        let (mut parts, body) = request.into_parts();
        let uri = parts.uri.clone();

        let host = uri
            .host()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?
            .to_string();
        let is_https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(HttpError::InvalidUrl(format!(
                    "Unsupported scheme: {}",
                    other.unwrap_or("none")
                )));
            }
        };
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });

        // 2. Rewrite to origin-form and fill default headers
        parts.uri = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .parse::<Uri>()
            .map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        let host_header = match uri.port_u16() {
            Some(port) => format!("{}:{}", host, port),
            None => host.clone(),
        };
        if !parts.headers.contains_key(HOST) {
            let value = HeaderValue::from_str(&host_header)
                .map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
            parts.headers.insert(HOST, value);
        }
        if !parts.headers.contains_key(USER_AGENT) {
            let value = HeaderValue::from_str(&self.config.user_agent)
                .map_err(|e| HttpError::Protocol(e.to_string()))?;
            parts.headers.insert(USER_AGENT, value);
        }

        let method = parts.method.clone();
        let request = Request::from_parts(parts, body);

        // 3. Connect
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        .map_err(|_| HttpError::Timeout)?
        .map_err(|e| HttpError::ConnectionFailed(e.to_string()))?;

        let ttfb_start = Instant::now();

        // 4. Exchange, over TLS for HTTPS
        let response = if is_https {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|_| HttpError::TlsError("Invalid server name".to_string()))?;

            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| HttpError::TlsError(e.to_string()))?;

            exchange(hyper_util::rt::TokioIo::new(tls_stream), request).await?
        } else {
            exchange(hyper_util::rt::TokioIo::new(stream), request).await?
        };

        let ttfb = ttfb_start.elapsed();

        // 5. Read response with size limit
        let status = response.status();
        let headers = response.headers().clone();

        let body = Limited::new(response.into_body(), self.config.max_body_size)
            .collect()
            .await
            .map_err(|e| HttpError::BodyError(e.to_string()))?
            .to_bytes();

        self.stats
            .bytes_downloaded
            .fetch_add(body.len() as u64, Ordering::Relaxed);

        debug!(
            "HTTP {} {}://{}{} -> {} ({} bytes, {:?} TTFB)",
            method,
            if is_https { "https" } else { "http" },
            host_header,
            uri.path(),
            status,
            body.len(),
            ttfb
        );

        Ok(Response {
            status,
            headers,
            body,
            ttfb,
        })
    }

    /// Get client statistics: (requests made, requests failed, bytes downloaded)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.requests_made.load(Ordering::Relaxed),
            self.stats.requests_failed.load(Ordering::Relaxed),
            self.stats.bytes_downloaded.load(Ordering::Relaxed),
        )
    }
}

/// Run one request over a fresh HTTP/1.1 connection
async fn exchange<I>(
    io: I,
    request: Request<Full<Bytes>>,
) -> Result<hyper::Response<Incoming>, HttpError>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| HttpError::Protocol(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            warn!("Connection error: {}", e);
        }
    });

    sender
        .send_request(request)
        .await
        .map_err(|e| HttpError::Protocol(e.to_string()))
}
