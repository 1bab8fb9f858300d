//! ListenerHandle: one running discovery responder + control server pair.
//!
//! Both sockets of a listener are bound before anything is spawned, so a
//! listener either starts completely or not at all.  Closing is idempotent and
//! bounded: tasks are cancelled, given [`CLOSE_GRACE`] to exit, and aborted if
//! they have not.  When [`ListenerHandle::close`] returns, both sockets have
//! been released and the port can be bound again.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ecp_core::{DeviceIdentity, ListenerSpec};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::dispatch::EventDispatcher;
use crate::application::supervisor::{
    BindError, ListenerLauncher, RunningListener, Transport,
};
use crate::infrastructure::network::control_server::{run_control_server, ControlService};
use crate::infrastructure::network::discovery::{bind_discovery_socket, run_discovery_responder};

/// Time each listener task gets to exit after cancellation before it is aborted.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Everything a listener needs besides its [`ListenerSpec`].
#[derive(Clone)]
pub struct ListenerContext {
    pub identity: Arc<DeviceIdentity>,
    pub dispatcher: EventDispatcher,
    pub idle_timeout: Duration,
}

/// A started listener.  Dropping it cancels its tasks without waiting.
pub struct ListenerHandle {
    spec: ListenerSpec,
    control_addr: SocketAddr,
    discovery_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ListenerHandle {
    /// Binds both sockets for `spec` and starts serving.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] if either socket cannot be bound; no socket is
    /// held and no task is left running in that case.
    pub async fn start(spec: ListenerSpec, ctx: &ListenerContext) -> Result<Self, BindError> {
        let addr = SocketAddr::new(spec.bind_address, spec.control_port);
        let tcp = TcpListener::bind(addr).await.map_err(|source| BindError {
            transport: Transport::Tcp,
            addr,
            source,
        })?;
        let udp = bind_discovery_socket(&spec)?;

        let local = |result: std::io::Result<SocketAddr>, transport| {
            result.map_err(|source| BindError {
                transport,
                addr,
                source,
            })
        };
        let control_addr = local(tcp.local_addr(), Transport::Tcp)?;
        let discovery_addr = local(udp.local_addr(), Transport::Udp)?;

        let cancel = CancellationToken::new();
        let service = Arc::new(
            ControlService::new(Arc::clone(&ctx.identity), ctx.dispatcher.clone())
                .with_idle_timeout(ctx.idle_timeout),
        );
        let tasks = vec![
            (
                "discovery",
                tokio::spawn(run_discovery_responder(
                    udp,
                    spec,
                    Arc::clone(&ctx.identity),
                    cancel.clone(),
                )),
            ),
            (
                "control",
                tokio::spawn(run_control_server(tcp, service, cancel.clone())),
            ),
        ];

        Ok(Self {
            spec,
            control_addr,
            discovery_addr,
            cancel,
            tasks,
        })
    }

    pub fn spec(&self) -> ListenerSpec {
        self.spec
    }

    /// Local address of the TCP control socket.
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Local address of the UDP discovery socket.
    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery_addr
    }

    pub fn is_closed(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stops both tasks and waits until their sockets are released.
    ///
    /// Calling this on a closed handle does nothing.
    pub async fn close(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        self.cancel.cancel();

        for (name, mut task) in self.tasks.drain(..) {
            match tokio::time::timeout(CLOSE_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!("{name} task for {} panicked: {e}", self.spec),
                Err(_) => {
                    warn!("{name} task for {} did not stop in time; aborting", self.spec);
                    task.abort();
                    // An aborted task finishes with a cancellation error
                    // once its future (and socket) has been dropped.
                    match task.await {
                        Err(e) if e.is_panic() => warn!("{name} task for {} panicked: {e}", self.spec),
                        result => debug!("{name} task for {} aborted: {result:?}", self.spec),
                    }
                }
            }
        }
        debug!("listener on {} closed", self.spec);
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl RunningListener for ListenerHandle {
    fn spec(&self) -> ListenerSpec {
        self.spec
    }

    async fn close(&mut self) {
        ListenerHandle::close(self).await;
    }
}

// ── Launcher ──────────────────────────────────────────────────────────────────

/// [`ListenerLauncher`] that binds real sockets.
pub struct NetworkLauncher {
    ctx: ListenerContext,
}

impl NetworkLauncher {
    pub fn new(ctx: ListenerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ListenerLauncher for NetworkLauncher {
    async fn launch(&self, spec: ListenerSpec) -> Result<Box<dyn RunningListener>, BindError> {
        let handle = ListenerHandle::start(spec, &self.ctx).await?;
        Ok(Box::new(handle))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
