//! ControlServer: serves the ECP routes and turns key requests into events.
//!
//! Routing and HTTP/1.1 framing come from axum (hyper underneath).  This
//! module supplies the route table, the handlers, and a [`Listener`] that
//! bounds how long a connection may sit idle.
//!
//! # Route table
//!
//! ```text
//! GET  /                   → device description XML
//! GET  /query/device-info  → device-info XML
//! GET  /query/apps         → installed-apps XML
//! POST /{verb}/{key}       → key command: dispatch, then 200
//!      key verb, other method  → 405
//!      any other verb          → 404
//!      unusable key            → 400 + Connection: close
//! anything else            → 404
//! ```
//!
//! Frames hyper cannot parse never reach a handler: hyper answers `400` and
//! closes that connection.
//!
//! # Ordering (for beginners)
//!
//! hyper serves each connection on its own task and handles the requests on
//! it one after another, even when a client pipelines them.  The key handler
//! dispatches its event before returning `200 OK`, so a client that waits for
//! each reply sees its keys delivered in the order it sent them.

use std::future::{Future, IntoFuture};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::serve::Listener;
use axum::Router;
use ecp_core::protocol::control::{
    ControlCommand, ProtocolError, APPS_PATH, CONTENT_TYPE_XML, DEVICE_DESCRIPTION_PATH,
    DEVICE_INFO_PATH,
};
use ecp_core::protocol::{device, SERVER_HEADER};
use ecp_core::DeviceIdentity;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, error, info, warn};

use crate::application::dispatch::EventDispatcher;

/// A connection that sends nothing for this long is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long open connections get to finish on shutdown before they are
/// aborted.
pub const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a failed `accept()` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Shared state for every connection of one listener.
pub struct ControlService {
    identity: Arc<DeviceIdentity>,
    dispatcher: EventDispatcher,
    idle_timeout: Duration,
}

impl ControlService {
    pub fn new(identity: Arc<DeviceIdentity>, dispatcher: EventDispatcher) -> Self {
        Self {
            identity,
            dispatcher,
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    /// Overrides [`IDLE_TIMEOUT`].
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    fn dispatch(&self, command: ControlCommand) {
        debug!(event_type = %command.event_type, key = %command.key, "key command");
        self.dispatcher
            .dispatch(command.into_event(self.identity.unique_service_name.clone()));
    }
}

// ── Routes ────────────────────────────────────────────────────────────────────

/// Builds the ECP router for one listener.
pub fn router(service: Arc<ControlService>) -> Router {
    Router::new()
        .route(DEVICE_DESCRIPTION_PATH, get(device_description))
        .route(DEVICE_INFO_PATH, get(device_info))
        .route(APPS_PATH, get(apps))
        .route("/{verb}/{key}", any(key_command))
        .fallback(not_found)
        .layer(axum::middleware::map_response(add_server_header))
        .with_state(service)
}

async fn device_description(State(service): State<Arc<ControlService>>) -> Response {
    xml(device::device_description(&service.identity))
}

async fn device_info(State(service): State<Arc<ControlService>>) -> Response {
    xml(device::device_info(&service.identity))
}

async fn apps() -> Response {
    xml(device::apps())
}

async fn key_command(
    State(service): State<Arc<ControlService>>,
    method: Method,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Response {
    let Path((verb, key)) = match path {
        Ok(path) => path,
        Err(rejection) => return bad_request(&ProtocolError::UndecodablePath(rejection.body_text())),
    };

    match ControlCommand::parse(&verb, &key) {
        Ok(Some(command)) if method == Method::POST => {
            service.dispatch(command);
            StatusCode::OK.into_response()
        }
        Ok(Some(_)) => (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "POST")]).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => bad_request(&e),
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn add_server_header(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(SERVER_HEADER));
    response
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, CONTENT_TYPE_XML)], body).into_response()
}

/// `400` for a request that names a key command but cannot be trusted; the
/// connection is closed after the response.
fn bad_request(err: &ProtocolError) -> Response {
    warn!("rejecting control request: {err}");
    (
        StatusCode::BAD_REQUEST,
        [(header::CONNECTION, "close")],
        format!("{err}\n"),
    )
        .into_response()
}

// ── Connections ───────────────────────────────────────────────────────────────

/// Accepts control connections and wraps each in a [`ControlStream`].
struct ControlListener {
    inner: TcpListener,
    idle_timeout: Duration,
    abort: CancellationToken,
}

impl Listener for ControlListener {
    type Io = ControlStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, peer)) => {
                    debug!("accepted control connection from {peer}");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("failed to set TCP_NODELAY for {peer}: {e}");
                    }
                    let stream = ControlStream::new(stream, self.idle_timeout, self.abort.clone());
                    return (stream, peer);
                }
                Err(e) => {
                    error!("control accept error: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// A control connection that fails its next read once it has been idle for
/// `idle_timeout`, and any I/O once `abort` fires.  hyper treats either
/// failure as the end of the connection.
struct ControlStream {
    inner: TcpStream,
    idle_timeout: Duration,
    idle: Pin<Box<Sleep>>,
    aborted: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl ControlStream {
    fn new(inner: TcpStream, idle_timeout: Duration, abort: CancellationToken) -> Self {
        Self {
            inner,
            idle_timeout,
            idle: Box::pin(tokio::time::sleep(idle_timeout)),
            aborted: Box::pin(abort.cancelled_owned()),
        }
    }

    fn poll_aborted(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        match self.aborted.as_mut().poll(cx) {
            Poll::Ready(()) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "control server shut down",
            )),
            Poll::Pending => Ok(()),
        }
    }
}

impl AsyncRead for ControlStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.poll_aborted(cx)?;

        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if buf.filled().len() > before {
                    let deadline = Instant::now() + this.idle_timeout;
                    this.idle.as_mut().reset(deadline);
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => match this.idle.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "control connection idle",
                ))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl AsyncWrite for ControlStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.poll_aborted(cx)?;
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Serves the ECP routes on `listener` until `cancel` fires, then gives open
/// connections [`CONNECTION_DRAIN_TIMEOUT`] to finish before aborting them.
///
/// The listening socket is released as soon as `cancel` fires.
pub async fn run_control_server(
    listener: TcpListener,
    service: Arc<ControlService>,
    cancel: CancellationToken,
) {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    info!("control server listening on TCP {local}");

    let abort = CancellationToken::new();
    let listener = ControlListener {
        inner: listener,
        idle_timeout: service.idle_timeout,
        abort: abort.clone(),
    };
    let shutdown = cancel.clone();
    let server = axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .into_future();
    tokio::pin!(server);

    let finished = tokio::select! {
        result = &mut server => Some(result),
        _ = cancel.cancelled() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => match tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, &mut server).await {
            Ok(result) => result,
            Err(_) => {
                warn!("aborting open control connections on {local}");
                abort.cancel();
                server.await
            }
        },
    };

    if let Err(e) = result {
        error!("control server on {local} failed: {e}");
    }
    info!("control server on {local} stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
