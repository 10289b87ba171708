//! Steward Daemon - Interaction Server for the Gateway Bridge
//!
//! Entry point for the steward daemon. A gateway bridge process holds the
//! platform connection and forwards interaction events over a Unix socket;
//! the daemon routes them to feature handlers and sends acknowledgments back.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (in-memory platform and storage)
//! steward-daemon
//!
//! # Persist documents under a directory
//! steward-daemon --storage-root /var/lib/steward
//!
//! # Talk to Discord (token read from STEWARD_BOT_TOKEN)
//! steward-daemon --platform discord --config /etc/steward/steward.toml
//!
//! # Verbose logging
//! RUST_LOG=debug steward-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

use steward_core::config::{ConfigOverrides, PlatformKind};
use steward_core::{
    build_router, default_config_path, load_config_from_path, Services, StewardConfig,
};

use server::{DaemonServer, ServerConfig};

/// Steward Daemon - routes panel interactions to feature handlers
#[derive(Parser, Debug)]
#[command(name = "steward-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "STEWARD_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Unix socket path for bridge connections
    #[arg(short = 's', long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Persist documents as files under this directory
    #[arg(long, value_name = "DIR")]
    storage_root: Option<PathBuf>,

    /// Platform client: memory or discord
    #[arg(long, value_name = "KIND")]
    platform: Option<PlatformKind>,

    /// PID file path (defaults to the socket path with a .pid extension)
    #[arg(long, env = "STEWARD_PID_FILE", value_name = "PATH")]
    pid_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "STEWARD_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref path) = self.socket_path {
            overrides = overrides.with_socket_path(path.clone());
        }
        if let Some(ref root) = self.storage_root {
            overrides = overrides.with_storage_root(root.clone());
        }
        if let Some(kind) = self.platform {
            overrides = overrides.with_platform(kind);
        }
        overrides
    }
}

/// File, then environment, then command line; validated
fn resolve_config(args: &Args) -> Result<StewardConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Write PID file
fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create PID directory: {parent:?}"))?;
    }

    let pid = std::process::id();
    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create PID file: {path:?}"))?;
    writeln!(file, "{pid}")?;

    info!(pid = pid, path = ?path, "PID file created");
    Ok(())
}

/// Remove PID file
fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "Failed to remove PID file");
        } else {
            info!(path = ?path, "PID file removed");
        }
    }
}

/// Refuse to start when the PID file names a live process
fn check_existing_daemon(pid_path: &Path) -> Result<()> {
    if !pid_path.exists() {
        return Ok(());
    }

    let pid_str = fs::read_to_string(pid_path)
        .with_context(|| format!("Failed to read PID file: {pid_path:?}"))?;
    let pid: i32 = pid_str.trim().parse().context("Invalid PID in file")?;

    // SAFETY: signal 0 only checks that the process exists
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        anyhow::bail!(
            "Another steward-daemon is already running (PID: {pid}). \
             Stop it first or remove {pid_path:?} if it's stale."
        );
    }

    warn!(pid = pid, "Removing stale PID file");
    fs::remove_file(pid_path)?;
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("steward_daemon={level},steward_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Flip `shutdown` on the first SIGTERM or SIGINT
fn install_signal_handlers(shutdown: watch::Sender<bool>) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }
        let _ = shutdown.send(true);
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Steward daemon starting"
    );

    let config = resolve_config(&args)?;
    info!(
        source = %config.source(),
        platform = ?config.platform.kind,
        storage = ?config.storage.kind,
        socket_path = ?config.daemon.socket_path,
        "Configuration resolved"
    );

    let services = Services::from_config(&config).context("Failed to initialize services")?;
    let router = Arc::new(build_router(&services).context("Failed to build routing table")?);
    info!(routes = router.len(), "Routing table built");

    let socket_path = config.daemon.socket_path.clone();
    let pid_path = args
        .pid_file
        .clone()
        .unwrap_or_else(|| socket_path.with_extension("pid"));

    check_existing_daemon(&pid_path)?;
    write_pid_file(&pid_path)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    install_signal_handlers(shutdown_tx)?;

    let mut server = DaemonServer::new(
        socket_path,
        ServerConfig::from(&config.daemon),
        services,
        router,
    );
    let result = server.run(shutdown_rx).await;

    info!("Shutting down...");
    remove_pid_file(&pid_path);

    match result {
        Ok(()) => {
            info!("Steward daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
