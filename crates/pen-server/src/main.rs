//! Pen Remote server: entry point.
//!
//! Listens for a remote-control device, decodes its line-delimited JSON
//! input messages, and replays them as local pointer and key events.  The
//! process is driven over stdin/stdout (see
//! [`pen_server::infrastructure::control`]); diagnostics go to stderr.
//!
//! # Usage
//!
//! ```text
//! pen-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>              Config file [default: platform config dir]
//!   --bind <ADDR>                Listening address, e.g. 0.0.0.0:0
//!   --name <NAME>                Advertised service name
//!   --identifier <UUID>          Advertised service identifier
//!   --max-connections <N>        Concurrent client limit
//!   --no-discovery               Do not answer LAN discovery probes
//!   --no-autostart               Wait for START instead of starting at once
//!   --control-format <FORMAT>    text | json
//!   --dispatcher <KIND>          native | log
//!   --write-config               Save the effective config and exit
//! ```
//!
//! Each flag can also be set through the `PEN_*` environment variable shown
//! in `--help`.  Flags override the config file.
//!
//! # What happens at startup
//!
//! 1. CLI arguments are parsed and the config file is loaded.
//! 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
//!    configured `log_level` applies.  With `--write-config` the merged
//!    configuration is saved to the config file and the process exits here.
//! 3. The transport, discovery registrar and input dispatcher are built and
//!    handed to a [`PenServer`].
//! 4. If autostart is on, the server starts with the configured name and
//!    identifier.
//! 5. The control channel runs until `QUIT`, end of stdin, or Ctrl+C, and
//!    stops the server on the way out.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pen_server::application::advertise::DiscoveryRegistrar;
use pen_server::application::dispatch::InputDispatcher;
use pen_server::application::lifecycle::PenServer;
use pen_server::infrastructure::control::{ControlChannel, ControlFormat, StartDefaults};
use pen_server::infrastructure::discovery::{NoopRegistrar, UdpDiscoveryRegistrar};
use pen_server::infrastructure::input_dispatch::LoggingDispatcher;
use pen_server::infrastructure::storage::config::{self, AppConfig};
use pen_server::infrastructure::transport::TcpTransport;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Which input dispatcher drives the local desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DispatcherKind {
    /// Inject real pointer and key events (Windows only).
    Native,
    /// Log each event and inject nothing.
    Log,
}

/// Pen Remote server.
#[derive(Debug, Parser)]
#[command(
    name = "pen-server",
    about = "Accepts remote-control connections and drives local pointer and key input",
    version
)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, env = "PEN_CONFIG")]
    config: Option<PathBuf>,

    /// Listening address; port 0 lets the OS choose.
    #[arg(long, env = "PEN_BIND")]
    bind: Option<String>,

    /// Service name shown to remote devices.
    #[arg(long, env = "PEN_NAME")]
    name: Option<String>,

    /// Service class identifier (UUID) the remote looks for.
    #[arg(long, env = "PEN_IDENTIFIER")]
    identifier: Option<String>,

    /// Maximum number of concurrent clients.
    #[arg(long, env = "PEN_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Do not answer LAN discovery probes.
    #[arg(long, env = "PEN_NO_DISCOVERY")]
    no_discovery: bool,

    /// Wait for a START command instead of starting immediately.
    #[arg(long, env = "PEN_NO_AUTOSTART")]
    no_autostart: bool,

    /// Output format of the stdout control stream.
    #[arg(long, value_enum, env = "PEN_CONTROL_FORMAT")]
    control_format: Option<ControlFormat>,

    /// Input dispatcher.
    #[arg(long, value_enum, default_value_t = DispatcherKind::Native, env = "PEN_DISPATCHER")]
    dispatcher: DispatcherKind,

    /// Save the effective configuration (file plus flags) and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    /// Loads the config file and applies the flag overrides.
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => match config::load_config() {
                Ok(cfg) => cfg,
                Err(config::ConfigError::NoPlatformConfigDir) => AppConfig::default(),
                Err(e) => return Err(e).context("failed to load config"),
            },
        };
        self.apply(&mut cfg);
        Ok(cfg)
    }

    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            cfg.network.bind_address = bind.clone();
        }
        if let Some(name) = &self.name {
            cfg.service.name = name.clone();
        }
        if let Some(identifier) = &self.identifier {
            cfg.service.identifier = identifier.clone();
        }
        if let Some(max) = self.max_connections {
            cfg.network.max_connections = max;
        }
        if self.no_discovery {
            cfg.network.discovery_enabled = false;
        }
        if self.no_autostart {
            cfg.service.autostart = false;
        }
        if let Some(format) = self.control_format {
            cfg.server.control_format = format;
        }
    }

    /// Saves `cfg` to the `--config` path, or the platform path when unset.
    fn write_config(&self, cfg: &AppConfig) -> anyhow::Result<PathBuf> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => config::config_file_path().context("cannot locate the config file")?,
        };
        config::save_config_to(cfg, &path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(path)
    }
}

// ── Adapter selection ─────────────────────────────────────────────────────────

fn build_registrar(cfg: &AppConfig) -> Arc<dyn DiscoveryRegistrar> {
    if cfg.network.discovery_enabled {
        Arc::new(UdpDiscoveryRegistrar::new(cfg.network.discovery_port))
    } else {
        Arc::new(NoopRegistrar)
    }
}

#[cfg(target_os = "windows")]
fn build_dispatcher(kind: DispatcherKind) -> Arc<dyn InputDispatcher> {
    use pen_server::infrastructure::input_dispatch::WindowsInputDispatcher;
    match kind {
        DispatcherKind::Native => Arc::new(WindowsInputDispatcher::new()),
        DispatcherKind::Log => Arc::new(LoggingDispatcher),
    }
}

#[cfg(not(target_os = "windows"))]
fn build_dispatcher(kind: DispatcherKind) -> Arc<dyn InputDispatcher> {
    if kind == DispatcherKind::Native {
        tracing::warn!("no native input dispatcher on this platform; events will only be logged");
    }
    Arc::new(LoggingDispatcher)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load_config()?;

    // Logs go to stderr; stdout carries only the control stream.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.server.log_level)),
        )
        .init();

    if cli.write_config {
        let path = cli.write_config(&cfg)?;
        info!("configuration written to {}", path.display());
        return Ok(());
    }

    let bind = cfg.bind_socket_addr()?;
    info!("Pen Remote server starting: bind={bind}");

    let (server, events) = PenServer::new(
        Arc::new(TcpTransport::new(bind)),
        build_registrar(&cfg),
        build_dispatcher(cli.dispatcher),
        cfg.server_settings(),
    );
    let server = Arc::new(server);

    if cfg.service.autostart {
        if let Err(e) = server
            .start(&cfg.service.name, &cfg.service.identifier)
            .await
        {
            error!("autostart failed: {e}");
        }
    }

    let channel = ControlChannel::new(
        Arc::clone(&server),
        cfg.server.control_format,
        StartDefaults {
            name: cfg.service.name.clone(),
            identifier: cfg.service.identifier.clone(),
        },
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C; shutting down"),
            Err(e) => {
                error!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    channel
        .run(stdin, &mut stdout, events, shutdown)
        .await
        .context("control channel failed")?;

    info!("Pen Remote server exited");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
