//! HTTP API
//!
//! hyper 1.x HTTP/1 server exposing:
//! - `GET /api/search?query=...` and `POST /api/search` (JSON body)
//! - `GET /api/sources` (`?check=true` runs health checks)
//! - `GET /health`
//! - `GET /metrics` (Prometheus text format)
//!
//! On shutdown the accept loop stops and open connections are closed
//! gracefully.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::aggregator::Aggregator;
use crate::error::{AggregatorError, Result};
use crate::metrics::gather_metrics;
use crate::schemas::RawSearchRequest;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Time open connections get to finish after shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state of the HTTP surface
pub struct AppState {
    pub aggregator: Aggregator,
    pub health_check_timeout: Duration,
    pub metrics_enabled: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    sources: usize,
}

/// Serves the API until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Search API listening");

    let (close_tx, _) = broadcast::channel::<()>(1);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let state = state.clone();
                let mut close_rx = close_tx.subscribe();

                connections.spawn(async move {
                    let service = service_fn(move |req| handle(req, state.clone()));
                    let conn = http1::Builder::new().serve_connection(io, service);
                    tokio::pin!(conn);

                    tokio::select! {
                        result = conn.as_mut() => {
                            if let Err(e) = result {
                                debug!(peer = %peer, error = %e, "Connection closed with error");
                            }
                        }
                        _ = close_rx.recv() => {
                            conn.as_mut().graceful_shutdown();
                            if let Err(e) = conn.await {
                                debug!(peer = %peer, error = %e, "Error while draining connection");
                            }
                        }
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, closing listener");
                break;
            }
        }

        // reap finished connection tasks
        while connections.try_join_next().is_some() {}
    }

    let _ = close_tx.send(());
    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!(remaining = connections.len(), "Connections still open after drain timeout");
        connections.abort_all();
    }

    info!("Search API stopped");
    Ok(())
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let body = if method == Method::POST {
        match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return Ok(body_error(e)),
        }
    } else {
        Bytes::new()
    };

    let response = route(&method, &path, query.as_deref(), body, &state).await;
    debug!(method = %method, path = %path, status = %response.status(), "Request handled");
    Ok(response)
}

/// Dispatches a request that has already been read
pub(crate) async fn route(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: Bytes,
    state: &AppState,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/api/search") => {
            match RawSearchRequest::from_query_string(query.unwrap_or_default()) {
                Ok(raw) => search(raw, state).await,
                Err(e) => aggregator_error(e),
            }
        }
        (&Method::POST, "/api/search") => match serde_json::from_slice::<RawSearchRequest>(&body) {
            Ok(raw) => search(raw, state).await,
            Err(e) => error_response(StatusCode::BAD_REQUEST, "invalid_request", e.to_string()),
        },
        (&Method::GET, "/api/sources") => {
            let sources = if check_requested(query) {
                state.aggregator.health_check(state.health_check_timeout).await
            } else {
                state.aggregator.list_sources()
            };
            json_response(StatusCode::OK, &sources)
        }
        (&Method::GET, "/health") => json_response(
            StatusCode::OK,
            &HealthBody {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
                sources: state.aggregator.registry().len(),
            },
        ),
        (&Method::GET, "/metrics") if state.metrics_enabled => {
            let mut response = Response::new(Full::new(Bytes::from(gather_metrics())));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        (_, "/api/search") | (_, "/api/sources") => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            format!("{} is not supported on {}", method, path),
        ),
        _ => error_response(StatusCode::NOT_FOUND, "not_found", format!("no route for {}", path)),
    }
}

async fn search(raw: RawSearchRequest, state: &AppState) -> Response<Full<Bytes>> {
    match state.aggregator.search_raw(raw).await {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => aggregator_error(e),
    }
}

fn check_requested(query: Option<&str>) -> bool {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .any(|(k, v)| k == "check" && matches!(v.as_ref(), "true" | "1" | "yes"))
        })
        .unwrap_or(false)
}

/// 413 for an oversized body, 400 for any other read failure
fn body_error(err: Box<dyn std::error::Error + Send + Sync>) -> Response<Full<Bytes>> {
    if err.downcast_ref::<LengthLimitError>().is_some() {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "body_too_large", err.to_string());
    }
    debug!(error = %err, "Failed to read request body");
    error_response(StatusCode::BAD_REQUEST, "invalid_body", err.to_string())
}

fn aggregator_error(err: AggregatorError) -> Response<Full<Bytes>> {
    match err {
        AggregatorError::InvalidRequest(message) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_request", message)
        }
        other => {
            error!(error = %other, "Search failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", other.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            let mut response = Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal_error\"}")));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn error_response(status: StatusCode, error: &str, message: String) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error, message })
}
