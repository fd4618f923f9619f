//! Snapshot fetch over HTTP.
//!
//! Issues plain HTTP/1.1 `GET` requests against the producer API. Every
//! request is bounded by a timeout and fails with [`FetchError::Timeout`]
//! rather than hanging.

use crate::model::{BackendPool, Service};
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{header, Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};
use urlencoding::encode;

/// Path of the full snapshot endpoint.
pub const SERVICES_PATH: &str = "/api/services";

/// Errors from a snapshot request.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid producer URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to connect to producer: {0}")]
    Connect(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("producer returned status {0}")]
    Status(StatusCode),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("snapshot fetch unavailable: {0}")]
    Unavailable(String),
}

/// Source of full service snapshots.
pub trait SnapshotFetcher: Send + Sync + 'static {
    /// Fetch every monitored service, in display order.
    fn fetch_services(&self) -> impl Future<Output = Result<Vec<Service>, FetchError>> + Send;
}

/// HTTP client for the producer API.
#[derive(Debug, Clone)]
pub struct HttpSnapshotClient {
    host: String,
    port: u16,
    base_path: String,
    timeout: Duration,
}

impl HttpSnapshotClient {
    /// Create a client for the API at `api_url` (e.g. `http://localhost:3001`).
    pub fn new(api_url: &str, request_timeout: Duration) -> Result<Self, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidUrl {
            url: api_url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = api_url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| invalid(&e.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http:// is supported"));
        }
        let host = uri.host().ok_or_else(|| invalid("missing host"))?.to_string();

        Ok(Self {
            host,
            port: uri.port_u16().unwrap_or(80),
            base_path: uri.path().trim_end_matches('/').to_string(),
            timeout: request_timeout,
        })
    }

    /// Fetch one service by key.
    pub async fn fetch_service(
        &self,
        resource_group: &str,
        load_balancer: &str,
    ) -> Result<Service, FetchError> {
        self.get_json(&format!(
            "{}/{}/{}",
            SERVICES_PATH,
            encode(resource_group),
            encode(load_balancer)
        ))
        .await
    }

    /// Fetch one backend pool of a service.
    pub async fn fetch_backend_pool(
        &self,
        resource_group: &str,
        load_balancer: &str,
        pool: &str,
    ) -> Result<BackendPool, FetchError> {
        self.get_json(&format!(
            "{}/{}/{}/pools/{}",
            SERVICES_PATH,
            encode(resource_group),
            encode(load_balancer),
            encode(pool)
        ))
        .await
    }

    /// Query the producer's own health endpoint.
    pub async fn check_health(&self) -> Result<serde_json::Value, FetchError> {
        self.get_json("/api/health").await
    }

    /// GET `path` and decode the JSON body, bounded by the request timeout.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let body = timeout(self.timeout, self.get(path))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get(&self, path: &str) -> Result<Bytes, FetchError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Spawn connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(error = %e, "producer connection error");
            }
        });

        let full_path = format!("{}{}", self.base_path, path);
        let req = Request::builder()
            .method(Method::GET)
            .uri(full_path.as_str())
            .header(header::HOST, format!("{}:{}", self.host, self.port))
            .header(header::ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())?;

        let response = sender.send_request(req).await?;
        let status = response.status();
        debug!(path = %full_path, status = status.as_u16(), "producer responded");

        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        Ok(response.into_body().collect().await?.to_bytes())
    }
}

impl SnapshotFetcher for HttpSnapshotClient {
    fn fetch_services(&self) -> impl Future<Output = Result<Vec<Service>, FetchError>> + Send {
        self.get_json(SERVICES_PATH)
    }
}
