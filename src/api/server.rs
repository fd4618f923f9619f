//! Status HTTP server.
//!
//! Exposes the reconciled service list, a fleet summary with connection
//! status, Prometheus metrics and a manual refresh trigger.

use crate::health::FleetSummary;
use crate::live::{ConnectionStatus, ManagerHandle};
use crate::metrics::MetricsCollector;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub const SERVICES_ROUTE: &str = "/api/services";
pub const SUMMARY_ROUTE: &str = "/api/summary";
pub const REFRESH_ROUTE: &str = "/api/refresh";
pub const HEALTH_ROUTE: &str = "/health";

/// Fleet counts plus connection details, as served on the summary route.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub fleet: FleetSummary,
    pub connection: ConnectionStatus,
    pub last_event: Option<&'static str>,
    /// `rg/lb` of the service the last update touched.
    pub last_service: Option<String>,
    pub last_update: Option<String>,
    pub error: Option<String>,
    pub refreshing: bool,
}

impl SummaryResponse {
    pub fn from_handle(handle: &ManagerHandle) -> Self {
        let link = handle.link_state();
        Self {
            fleet: handle.fleet_summary(),
            connection: link.status,
            last_event: link.last_event.map(|kind| kind.as_str()),
            last_service: link.last_service.map(|key| key.to_string()),
            last_update: link
                .last_update
                .map(|at| humantime::format_rfc3339_millis(at).to_string()),
            error: link.last_error,
            refreshing: link.refreshing,
        }
    }
}

struct Context {
    handle: ManagerHandle,
    collector: MetricsCollector,
    metrics_path: String,
}

/// HTTP server for the status API.
pub struct StatusServer {
    address: SocketAddr,
    context: Arc<Context>,
}

impl StatusServer {
    pub fn new(
        address: SocketAddr,
        metrics_path: String,
        handle: ManagerHandle,
        collector: MetricsCollector,
    ) -> Self {
        Self {
            address,
            context: Arc::new(Context {
                handle,
                collector,
                metrics_path,
            }),
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        let listener = match TcpListener::bind(self.address).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, address = %self.address, "failed to bind status server");
                return;
            }
        };

        self.serve(listener, shutdown).await;
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) {
        let address = listener.local_addr().unwrap_or(self.address);
        info!(address = %address, metrics_path = %self.context.metrics_path, "status server started");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let context = Arc::clone(&self.context);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let context = Arc::clone(&context);
                                    async move { handle_request(req, &context).await }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(error = %e, "status connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept status connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("status server shutting down");
                    break;
                }
            }
        }
    }
}

async fn handle_request<B>(
    req: Request<B>,
    context: &Context,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();
    let method = req.method().clone();

    debug!(path = %path, method = %method, "status request");

    let expected = if path == SERVICES_ROUTE
        || path == SUMMARY_ROUTE
        || path == HEALTH_ROUTE
        || path == context.metrics_path
    {
        Method::GET
    } else if path == REFRESH_ROUTE {
        Method::POST
    } else {
        return Ok(text(StatusCode::NOT_FOUND, "Not found\n"));
    };

    if method != expected {
        let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n");
        if let Ok(allow) = header::HeaderValue::from_str(expected.as_str()) {
            response.headers_mut().insert(header::ALLOW, allow);
        }
        return Ok(response);
    }

    let response = match path.as_str() {
        SERVICES_ROUTE => json(StatusCode::OK, context.handle.services().services()),
        SUMMARY_ROUTE => json(StatusCode::OK, &SummaryResponse::from_handle(&context.handle)),
        HEALTH_ROUTE => text(StatusCode::OK, "OK\n"),
        REFRESH_ROUTE => match context.handle.refresh().await {
            Ok(count) => {
                info!(services = count, "manual refresh completed");
                json(StatusCode::OK, &SummaryResponse::from_handle(&context.handle))
            }
            Err(e) => {
                warn!(error = %e, "manual refresh failed");
                json(
                    StatusCode::BAD_GATEWAY,
                    &serde_json::json!({ "error": e.to_string() }),
                )
            }
        },
        _ => metrics(&context.collector),
    };

    Ok(response)
}

fn metrics(collector: &MetricsCollector) -> Response<Full<Bytes>> {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, collector.registry()) {
        error!(error = %e, "failed to encode metrics");
        return text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics\n");
    }
    respond(
        StatusCode::OK,
        "text/plain; version=0.0.4; charset=utf-8",
        Bytes::from(buffer),
    )
}

fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", Bytes::from(body)),
        Err(e) => {
            error!(error = %e, "failed to encode response");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode response\n")
        }
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    respond(status, "text/plain", Bytes::from_static(body.as_bytes()))
}

fn respond(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
}
