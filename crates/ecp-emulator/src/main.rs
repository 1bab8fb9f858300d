//! ECP emulator entry point.
//!
//! Makes this host look like a streaming media player on the LAN: remote apps
//! discover it over SSDP and send key presses over ECP, which are published
//! as JSON lines on stdout (or to the log with `--sink log`).
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config file, apply CLI overrides, validate
//!  └─ EventDispatcher + forwarder task ──► EventSink (stdout / log)
//!  └─ ServiceSupervisor::on_ready()
//!       └─ per listener (NetworkLauncher)
//!            ├─ DiscoveryResponder (UDP task)
//!            └─ ControlServer      (TCP accept task + one task per connection)
//!  └─ Ctrl-C ──► ServiceSupervisor::on_shutdown() ──► forwarder drains
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ecp_core::{DeviceIdentity, PortEntry};
use ecp_emulator::application::dispatch::{spawn_forwarder, EventDispatcher, EventSink};
use ecp_emulator::application::supervisor::ServiceSupervisor;
use ecp_emulator::infrastructure::network::control_server::IDLE_TIMEOUT;
use ecp_emulator::infrastructure::network::listener::{ListenerContext, NetworkLauncher};
use ecp_emulator::infrastructure::sinks::{JsonLinesSink, LogSink};
use ecp_emulator::infrastructure::storage::config::{load_config, load_config_from, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Where published events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// One JSON object per line on stdout.
    Json,
    /// `info`-level log records on stderr.
    Log,
}

/// Emulated streaming-player endpoint.
///
/// Every flag overrides the matching setting from the configuration file.
#[derive(Debug, Parser)]
#[command(
    name = "ecp-emulator",
    about = "Answers SSDP discovery and ECP key commands as an emulated streaming player",
    version
)]
struct Cli {
    /// Configuration file.  Defaults to the platform config directory.
    #[arg(long, env = "ECP_EMULATOR_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind every listener to.
    #[arg(long, env = "ECP_EMULATOR_HOST_IP")]
    host_ip: Option<String>,

    /// Comma-separated ports, each `N` or `N:M` (bind N, advertise M).
    #[arg(long, value_delimiter = ',', env = "ECP_EMULATOR_LISTEN_PORTS")]
    listen_ports: Option<Vec<String>>,

    /// Address placed in discovery replies.
    #[arg(long, env = "ECP_EMULATOR_ADVERTISE_IP")]
    advertise_ip: Option<String>,

    /// Do not join the SSDP multicast group (unicast searches still work).
    #[arg(long)]
    no_multicast: bool,

    /// Name shown by remote apps.
    #[arg(long, env = "ECP_EMULATOR_FRIENDLY_NAME")]
    friendly_name: Option<String>,

    /// Where to publish control events.
    #[arg(long, value_enum, default_value_t = SinkKind::Json)]
    sink: SinkKind,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(host_ip) = &self.host_ip {
            config.emulator.host_ip = host_ip.clone();
        }
        if let Some(ports) = &self.listen_ports {
            config.emulator.listen_ports = ports.iter().map(|p| PortEntry::from(p.as_str())).collect();
        }
        if let Some(advertise_ip) = &self.advertise_ip {
            config.emulator.advertise_ip = Some(advertise_ip.clone());
        }
        if self.no_multicast {
            config.emulator.upnp_bind_multicast = false;
        }
        if let Some(name) = &self.friendly_name {
            config.emulator.friendly_name = name.clone();
        }
    }

    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => load_config().context("failed to load config file")?,
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the event stream.  Level is
    // overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Validation happens before any socket is opened.
    let specs = config.validate().context("invalid configuration")?;

    let identity = Arc::new(DeviceIdentity::generate(config.emulator.friendly_name.clone()));
    info!(
        "ECP emulator starting as \"{}\" (USN {})",
        identity.friendly_name, identity.unique_service_name
    );

    // ── Event delivery ────────────────────────────────────────────────────────
    let dispatcher = EventDispatcher::new(config.dispatch.queue_capacity);
    let sink: Arc<dyn EventSink> = match cli.sink {
        SinkKind::Json => Arc::new(JsonLinesSink::stdout()),
        SinkKind::Log => Arc::new(LogSink),
    };
    let forwarder = spawn_forwarder(dispatcher.subscribe(), sink, config.dispatch.topic.clone());

    // ── Listeners ─────────────────────────────────────────────────────────────
    let launcher = Arc::new(NetworkLauncher::new(ListenerContext {
        identity: Arc::clone(&identity),
        dispatcher: dispatcher.clone(),
        idle_timeout: IDLE_TIMEOUT,
    }));
    let supervisor = ServiceSupervisor::new(specs, launcher, dispatcher);

    let report = supervisor.on_ready().await.unwrap_or_default();
    if report.started.is_empty() {
        supervisor.on_shutdown().await;
        if let Err(e) = forwarder.await {
            warn!("event forwarder task failed: {e}");
        }
        anyhow::bail!("no listener could be started");
    }
    if !report.all_started() {
        warn!(
            "{} of {} listeners failed to start",
            report.failed.len(),
            report.failed.len() + report.started.len()
        );
    }

    info!("ECP emulator ready.  Press Ctrl-C to exit.");

    // ── Ctrl-C / shutdown ─────────────────────────────────────────────────────
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}; shutting down");
    } else {
        info!("shutdown signal received");
    }

    supervisor.on_shutdown().await;
    let published = forwarder.await.context("event forwarder task failed")?;

    info!("ECP emulator stopped ({published} events published)");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
