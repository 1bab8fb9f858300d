//! ServiceSupervisor: lifecycle of every configured listener.
//!
//! # State machine
//!
//! ```text
//! Idle ──on_ready──► Starting ──all launches done──► Running
//!   │                                                  │
//!   │                                             on_shutdown
//!   │                                                  ▼
//!   └────────────on_shutdown─────────────► Stopped ◄── Stopping
//! ```
//!
//! - `on_ready` launches one listener (discovery responder + control server)
//!   per [`ListenerSpec`].  A listener that fails to bind is reported in the
//!   [`StartReport`] and skipped; its siblings still start.
//! - `on_shutdown` closes every live listener, waits for their sockets to be
//!   released, then closes the event dispatcher so nothing is published after
//!   `Stopped`.
//! - Both signals are idempotent.  A second `on_ready` or `on_shutdown` is a
//!   logged no-op.
//!
//! Start and stop run under one async mutex, so a shutdown that arrives while
//! listeners are still being launched waits for the launch to finish and then
//! stops everything it produced.
//!
//! The supervisor never touches sockets itself: listeners are produced by an
//! injected [`ListenerLauncher`], which keeps this module testable without a
//! network.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ecp_core::ListenerSpec;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::application::dispatch::EventDispatcher;

/// Transport whose socket failed to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => f.write_str("UDP"),
            Transport::Tcp => f.write_str("TCP"),
        }
    }
}

/// One listener's socket could not be acquired.
///
/// Isolated to that listener; never fatal to the others.
#[derive(Debug, Error)]
#[error("failed to bind {transport} socket on {addr}: {source}")]
pub struct BindError {
    pub transport: Transport,
    pub addr: SocketAddr,
    #[source]
    pub source: std::io::Error,
}

/// Lifecycle phase of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// A listener that is up and serving.
#[async_trait]
pub trait RunningListener: Send {
    /// The spec this listener was launched from.
    fn spec(&self) -> ListenerSpec;

    /// Cancels all socket tasks and waits (bounded) until they are gone.
    ///
    /// Closing an already-closed listener is a no-op.
    async fn close(&mut self);
}

/// Factory for running listeners.
///
/// The network implementation binds a UDP discovery socket and a TCP control
/// socket; tests substitute an in-memory double.
#[async_trait]
pub trait ListenerLauncher: Send + Sync {
    /// Binds and starts serving `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] if either socket cannot be bound.  Nothing is
    /// left running in that case.
    async fn launch(&self, spec: ListenerSpec) -> Result<Box<dyn RunningListener>, BindError>;
}

/// Outcome of one `on_ready` call, one entry per configured listener.
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<ListenerSpec>,
    pub failed: Vec<(ListenerSpec, BindError)>,
}

impl StartReport {
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns the live listener set and drives the lifecycle state machine.
pub struct ServiceSupervisor {
    specs: Vec<ListenerSpec>,
    launcher: Arc<dyn ListenerLauncher>,
    dispatcher: EventDispatcher,
    live: Mutex<Vec<Box<dyn RunningListener>>>,
    state: watch::Sender<SupervisorState>,
}

impl ServiceSupervisor {
    pub fn new(
        specs: Vec<ListenerSpec>,
        launcher: Arc<dyn ListenerLauncher>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            specs,
            launcher,
            dispatcher,
            live: Mutex::new(Vec::new()),
            state,
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Number of listeners currently serving.
    pub async fn live_listener_count(&self) -> usize {
        self.live.lock().await.len()
    }

    fn transition(&self, next: SupervisorState) {
        let prev = self.state.send_replace(next);
        debug!(from = ?prev, to = ?next, "supervisor state changed");
    }

    /// Handles the host's "ready" signal: launches every configured listener.
    ///
    /// Returns `None` if the supervisor has already left `Idle`.
    pub async fn on_ready(&self) -> Option<StartReport> {
        let mut live = self.live.lock().await;
        if self.state() != SupervisorState::Idle {
            debug!(state = ?self.state(), "ready signal ignored");
            return None;
        }
        self.transition(SupervisorState::Starting);

        let mut report = StartReport::default();
        for spec in &self.specs {
            match self.launcher.launch(*spec).await {
                Ok(listener) => {
                    info!("listener started on {spec}");
                    report.started.push(*spec);
                    live.push(listener);
                }
                Err(e) => {
                    warn!("listener on {spec} failed to start: {e}");
                    report.failed.push((*spec, e));
                }
            }
        }

        self.transition(SupervisorState::Running);
        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "emulator running"
        );
        Some(report)
    }

    /// Handles the host's "shutdown" signal: closes every live listener.
    ///
    /// Returns `false` if a shutdown already happened.
    pub async fn on_shutdown(&self) -> bool {
        let mut live = self.live.lock().await;
        match self.state() {
            SupervisorState::Stopping | SupervisorState::Stopped => {
                debug!("shutdown signal ignored; already stopped");
                return false;
            }
            SupervisorState::Idle => {
                self.dispatcher.close();
                self.transition(SupervisorState::Stopped);
                info!("emulator stopped before it was started");
                return true;
            }
            SupervisorState::Starting | SupervisorState::Running => {}
        }
        self.transition(SupervisorState::Stopping);

        let mut closing = JoinSet::new();
        for mut listener in live.drain(..) {
            closing.spawn(async move {
                listener.close().await;
                listener.spec()
            });
        }
        while let Some(result) = closing.join_next().await {
            match result {
                Ok(spec) => debug!("listener on {spec} closed"),
                Err(e) => warn!("listener close task failed: {e}"),
            }
        }

        self.dispatcher.close();
        self.transition(SupervisorState::Stopped);
        info!("emulator stopped");
        true
    }

    /// Issues the ready signal without waiting for listeners to come up.
    pub fn spawn_ready(self: &Arc<Self>) -> JoinHandle<Option<StartReport>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.on_ready().await })
    }

    /// Issues the shutdown signal without waiting for sockets to close.
    pub fn spawn_shutdown(self: &Arc<Self>) -> JoinHandle<bool> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.on_shutdown().await })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
