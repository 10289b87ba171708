//! Daemon Server Implementation
//!
//! This module provides the server loop for the steward daemon:
//! - Accepts gateway bridge connections on a Unix socket
//! - Spawns a handler task per connection
//! - Offers every interaction to the follow-up collector, then the router
//! - Supports graceful shutdown
//!
//! # Connection Layout
//!
//! ```text
//!                     DaemonServer
//!                          │
//!          ┌───────────────┼───────────────┐
//!          │               │               │
//!      bridge-1        bridge-2        bridge-3
//!      (conn-1)        (conn-2)        (conn-3)
//!          │               │               │
//!          └───────────────┴───────────────┘
//!                          │
//!           FollowUpCollector → ActionRouter
//! ```
//!
//! Each connection has a reader loop and a writer task. Interactions are
//! handled on their own tasks, so a flow waiting for a follow-up selection
//! never blocks the connection it arrived on.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Instrument};

use steward_core::config::DaemonSettings;
use steward_core::transport::{write_frame, FrameReader};
use steward_core::{
    ActionRouter, BridgeFrame, Delivery, InteractionEvent, PlatformError, Reply, Responder,
    Services,
};

/// Identifies one bridge connection for logging and bookkeeping
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state tracking
struct ConnectionState {
    /// When the connection was established
    connected_at: Instant,
    /// Remote peer UID (from `SO_PEERCRED`)
    peer_uid: Option<u32>,
    /// Handle to abort the connection task
    abort_handle: tokio::task::AbortHandle,
}

/// Configuration for the daemon server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Per-connection outbound frame queue
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            outbound_capacity: 256,
        }
    }
}

impl From<&DaemonSettings> for ServerConfig {
    fn from(settings: &DaemonSettings) -> Self {
        Self {
            max_connections: settings.max_connections,
            ..Self::default()
        }
    }
}

/// Sends acknowledgments back over the bridge connection the event came from
#[derive(Clone)]
struct BridgeResponder {
    tx: mpsc::Sender<BridgeFrame>,
}

#[async_trait]
impl Responder for BridgeResponder {
    async fn respond(&self, interaction_id: &str, reply: Reply) -> Result<(), PlatformError> {
        self.tx
            .send(BridgeFrame::Reply {
                interaction_id: interaction_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| PlatformError::Transport("bridge connection closed".to_string()))
    }
}

/// The main daemon server
pub struct DaemonServer {
    /// Path to the Unix socket
    socket_path: PathBuf,
    /// Server configuration
    server_config: ServerConfig,
    /// Shared core collaborators
    services: Services,
    /// Frozen routing table
    router: Arc<ActionRouter>,
    /// Active connection state (task handles, peer info)
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
    next_connection: AtomicU64,
}

impl DaemonServer {
    /// Create a new daemon server
    pub fn new(
        socket_path: PathBuf,
        server_config: ServerConfig,
        services: Services,
        router: Arc<ActionRouter>,
    ) -> Self {
        Self {
            socket_path,
            server_config,
            services,
            router,
            connection_states: Arc::new(DashMap::new()),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Prepare the socket path (create directory, remove stale socket)
    fn prepare_socket(&self) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create socket directory: {parent:?}"))?;
                info!(path = ?parent, "Created socket directory");
            }
        }

        if self.socket_path.exists() {
            warn!(path = ?self.socket_path, "Removing stale socket file");
            fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove stale socket: {:?}", self.socket_path)
            })?;
        }

        Ok(())
    }

    /// Restrict the socket to its owner
    fn restrict_socket(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&self.socket_path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {:?}", self.socket_path))
    }

    /// Bind the listening socket
    pub fn bind(&self) -> Result<UnixListener> {
        self.prepare_socket()?;
        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind to {:?}", self.socket_path))?;
        self.restrict_socket()?;
        info!(path = ?self.socket_path, "Listening for bridge connections");
        Ok(listener)
    }

    /// Bind, then serve until `shutdown` flips to `true`
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections on an already bound listener until shutdown
    pub async fn serve(
        &mut self,
        listener: UnixListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let stream = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown handle dropped, stopping accept loop");
                        break;
                    }
                    continue;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        continue;
                    }
                },
            };

            if self.connection_states.len() >= self.server_config.max_connections {
                warn!(
                    max_connections = self.server_config.max_connections,
                    "Connection limit reached, rejecting new connection"
                );
                drop(stream);
                continue;
            }

            let peer_uid = stream.peer_cred().ok().map(|cred| cred.uid());
            // SAFETY: getuid has no preconditions and cannot fail
            let our_uid = unsafe { libc::getuid() };
            if let Some(uid) = peer_uid {
                if uid != our_uid && uid != 0 {
                    warn!(
                        peer_uid = uid,
                        our_uid = our_uid,
                        "Rejecting connection from different user"
                    );
                    drop(stream);
                    continue;
                }
            }

            let conn_id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
            info!(
                conn_id = %conn_id,
                peer_uid = ?peer_uid,
                active_connections = self.connection_states.len() + 1,
                "New connection accepted"
            );

            let task_handle = tokio::spawn(
                Self::handle_connection(
                    conn_id,
                    stream,
                    self.services.clone(),
                    Arc::clone(&self.router),
                    Arc::clone(&self.connection_states),
                    self.server_config.outbound_capacity,
                )
                .instrument(tracing::info_span!("connection", %conn_id)),
            );

            self.connection_states.insert(
                conn_id,
                ConnectionState {
                    connected_at: Instant::now(),
                    peer_uid,
                    abort_handle: task_handle.abort_handle(),
                },
            );
            // The handler may have finished before it was registered
            if task_handle.is_finished() {
                self.connection_states.remove(&conn_id);
            }
        }

        info!("Shutdown requested, stopping accept loop");
        self.shutdown()
    }

    /// Handle a single bridge connection
    ///
    /// Frames are read until EOF or an unrecoverable transport error. The
    /// writer task drains once every in-flight interaction has answered.
    async fn handle_connection(
        conn_id: ConnectionId,
        stream: UnixStream,
        services: Services,
        router: Arc<ActionRouter>,
        connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
        outbound_capacity: usize,
    ) {
        info!("Connection handler started");

        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::channel::<BridgeFrame>(outbound_capacity);

        let writer = tokio::spawn(
            async move {
                while let Some(frame) = rx.recv().await {
                    if let Err(e) = write_frame(&mut write_half, &frame).await {
                        error!(error = %e, "Write error");
                        break;
                    }
                }
            }
            .in_current_span(),
        );

        let responder = BridgeResponder { tx: tx.clone() };
        let mut reader = FrameReader::new(read_half);

        loop {
            match reader.read_frame().await {
                Ok(Some(BridgeFrame::Interaction(event))) => {
                    debug!(interaction_id = %event.id, token = event.custom_id(), "Received interaction");
                    tokio::spawn(
                        handle_interaction(
                            services.clone(),
                            Arc::clone(&router),
                            responder.clone(),
                            event,
                        )
                        .in_current_span(),
                    );
                }
                Ok(Some(BridgeFrame::Ping)) => {
                    if tx.send(BridgeFrame::Pong).await.is_err() {
                        break;
                    }
                }
                Ok(Some(other)) => {
                    warn!(frame = ?other, "Unexpected frame from bridge");
                }
                Ok(None) => {
                    info!("Bridge disconnected (EOF)");
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Dropped malformed frame");
                }
                Err(e) => {
                    error!(error = %e, "Read error");
                    break;
                }
            }
        }

        // The writer ends once every in-flight responder is gone
        drop(responder);
        drop(tx);
        if let Err(e) = writer.await {
            warn!(error = %e, "Writer task failed");
        }

        if let Some((_, state)) = connection_states.remove(&conn_id) {
            info!(
                peer_uid = ?state.peer_uid,
                connected_secs = state.connected_at.elapsed().as_secs(),
                active_connections = connection_states.len(),
                "Connection handler finished"
            );
        }
    }

    /// Graceful shutdown
    fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown");

        let conn_ids: Vec<ConnectionId> = self.connection_states.iter().map(|r| *r.key()).collect();
        for conn_id in conn_ids {
            if let Some((_, state)) = self.connection_states.remove(&conn_id) {
                info!(conn_id = %conn_id, "Aborting connection");
                state.abort_handle.abort();
            }
        }

        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path)
                .with_context(|| format!("Failed to remove socket: {:?}", self.socket_path))?;
            info!(path = ?self.socket_path, "Socket file removed");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Get number of active connections
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connection_states.len()
    }
}

/// Give a waiting flow the first chance at the event, then route it
async fn handle_interaction(
    services: Services,
    router: Arc<ActionRouter>,
    responder: BridgeResponder,
    event: InteractionEvent,
) {
    match services.collector.try_deliver(event) {
        Delivery::Claimed => debug!("Follow-up delivered to a waiting flow"),
        Delivery::Unclaimed(event) => {
            let outcome = router.dispatch_event(&event, &responder).await;
            debug!(interaction_id = %event.id, ?outcome, "Interaction dispatched");
        }
    }
}
