//! The HTTP front-end.
//!
//! Routes:
//!
//! - `/auth` answers nginx `auth_request` sub-requests. The path comes from
//!   `X-Original-URI`, falling back to the request path when the header is
//!   absent. Allowed paths get 200, denied paths 403, and errors 500,
//!   including a header value that is not visible ASCII.
//! - `/health` always answers 200.
//! - `/debug` dumps [`tuf_gate::Diagnostics`] as JSON.
//! - `/` serves a banner; anything else is 404.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tuf_gate::{AuthorizationError, AuthorizationService};

/// Header nginx uses to pass the URI of the original request.
pub const ORIGINAL_URI: HeaderName = HeaderName::from_static("x-original-uri");

/// Response header reporting the decision behind `/auth`.
pub const DECISION: HeaderName = HeaderName::from_static("x-tuf-gate-decision");

const BANNER: &str = "TUF Gate - delegated path authorization for nginx auth_request";

type Body = Full<Bytes>;

/// A running server.
pub struct Server {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Server {
    /// Serve `service` on `listener` until [`Server::stop`] is called.
    pub fn serve(listener: TcpListener, service: Arc<AuthorizationService>) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        let (stream, peer) = match result {
                            Ok(accepted) => accepted,
                            Err(error) => {
                                tracing::warn!(%error, "failed to accept connection");
                                continue;
                            }
                        };
                        let service = service.clone();
                        tokio::spawn(async move {
                            let handler = hyper::service::service_fn(move |request| {
                                let service = service.clone();
                                async move { handle_request(request, &service) }
                            });
                            if let Err(error) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), handler)
                                .await
                            {
                                tracing::debug!(%peer, %error, "connection closed with error");
                            }
                        });
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL of the server.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

fn handle_request(
    request: Request<Incoming>,
    service: &AuthorizationService,
) -> Result<Response<Body>, Infallible> {
    let response = match request.uri().path() {
        "/auth" => authorize(&request, service),
        "/health" => text(StatusCode::OK, "healthy"),
        "/debug" => debug(service),
        "/" => text(StatusCode::OK, BANNER),
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

fn authorize(request: &Request<Incoming>, service: &AuthorizationService) -> Response<Body> {
    let method = request.method();
    let outcome = original_path(request)
        .and_then(|path| Ok((path, service.verify_path(path)?)));

    match outcome {
        Ok((path, decision)) => {
            let status =
                StatusCode::from_u16(decision.status_code()).unwrap_or(StatusCode::FORBIDDEN);
            if decision.is_allowed() {
                tracing::info!(path, %method, %decision, "allowed");
            } else {
                tracing::info!(path, %method, %decision, "denied");
            }
            let body = if decision.is_allowed() { "OK" } else { "Forbidden" };
            with_decision(text(status, body), &decision.to_string())
        }
        Err(error) => {
            tracing::error!(%method, %error, "verification failed");
            with_decision(
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
                "error",
            )
        }
    }
}

fn original_path(request: &Request<Incoming>) -> Result<&str, AuthorizationError> {
    match request.headers().get(&ORIGINAL_URI) {
        Some(value) if !value.is_empty() => value.to_str().map_err(|_| {
            AuthorizationError::Internal(format!("{ORIGINAL_URI} is not visible ASCII"))
        }),
        _ => Ok(request.uri().path()),
    }
}

fn debug(service: &AuthorizationService) -> Response<Body> {
    match serde_json::to_vec(&service.diagnostics()) {
        Ok(json) => {
            let mut response = respond(StatusCode::OK, Bytes::from(json));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(error) => {
            tracing::error!(%error, "failed to encode diagnostics");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = respond(status, Bytes::from_static(body.as_bytes()));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn respond(status: StatusCode, body: Bytes) -> Response<Body> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
}

fn with_decision(mut response: Response<Body>, decision: &str) -> Response<Body> {
    // Role names are arbitrary strings and may not be valid header values.
    if let Ok(value) = HeaderValue::from_str(decision) {
        response.headers_mut().insert(DECISION, value);
    }
    response
}
