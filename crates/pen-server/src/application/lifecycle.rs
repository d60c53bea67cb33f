//! Service lifecycle: the Stopped ⇄ Running state machine.
//!
//! [`PenServer`] is constructed once per process and shared by reference
//! (usually `Arc<PenServer>`).  It owns its collaborators (transport,
//! registrar, input dispatcher) and, while running, the per-run resources:
//! the connection registry, the accept-loop task and the dispatch worker.
//!
//! # State transitions
//!
//! ```text
//!             start(name, identifier)
//!   Stopped ─────────────────────────► Running
//!      ▲                                  │
//!      └────────────── stop() ────────────┘
//! ```
//!
//! `start` on a running server returns [`StartError::AlreadyRunning`] and
//! touches nothing.  `stop` on a stopped server does nothing.
//! [`PenServer::disconnect_clients`] drops the current clients without
//! leaving Running.  Both take the
//! same async mutex, so they may be called from any task.
//!
//! # Start sequence
//!
//! 1. Parse the identifier.
//! 2. Bind and listen on the transport; read back the port.  A failure here
//!    is a [`SetupError`]; the server stays Stopped.
//! 3. Advertise `{name, identifier, port, comment}`.  Failure is a warning.
//! 4. Start the dispatch worker and the accept loop.
//! 5. Emit `ServerStarted { port }`.
//!
//! # Stop sequence
//!
//! 1. Set the stop flag and wake the accept loop.
//! 2. Withdraw the advertisement (best-effort).
//! 3. Close every registered connection.
//! 4. Wait for the accept loop, which closes the endpoint and waits for the
//!    sessions.
//! 5. Drain the dispatch worker.
//! 6. Emit `ServerStopped`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use pen_core::{ServerEvent, ServerState, ServiceDescriptor};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::accept::{run_accept_loop, AcceptContext};
use crate::application::advertise::DiscoveryRegistrar;
use crate::application::dispatch::{
    spawn_dispatch_worker, DispatchHandle, InputDispatcher, DEFAULT_DISPATCH_QUEUE_DEPTH,
};
use crate::application::events::{EventSink, DEFAULT_EVENT_QUEUE_DEPTH};
use crate::application::registry::{ConnectionRegistry, DEFAULT_MAX_CONNECTIONS};
use crate::application::session::SessionContext;
use crate::application::transport::{SetupError, Transport};

/// Comment published with the advertisement unless configured otherwise.
pub const DEFAULT_COMMENT: &str = "Remote control for Drawing Pen";

/// Errors returned by [`PenServer::start`].
#[derive(Debug, Error)]
pub enum StartError {
    /// The server is already running.  Nothing was changed.
    #[error("server is already running")]
    AlreadyRunning,

    /// The identifier is not a UUID.  Nothing was changed.
    #[error("invalid service identifier {0:?}")]
    InvalidIdentifier(String),

    /// The listening endpoint could not be brought up.
    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// Runtime tuning for the server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Comment published alongside the service name.
    pub comment: String,
    /// Upper bound on one accept wait before the stop flag is re-checked.
    pub accept_poll_interval: Duration,
    pub max_connections: usize,
    pub max_line_length: usize,
    /// How long `stop` waits for sessions and the dispatch worker.
    pub shutdown_timeout: Duration,
    pub dispatch_queue_depth: usize,
    pub event_queue_depth: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            comment: DEFAULT_COMMENT.to_string(),
            accept_poll_interval: Duration::from_secs(1),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_line_length: pen_core::protocol::framing::DEFAULT_MAX_LINE_LEN,
            shutdown_timeout: Duration::from_secs(5),
            dispatch_queue_depth: DEFAULT_DISPATCH_QUEUE_DEPTH,
            event_queue_depth: DEFAULT_EVENT_QUEUE_DEPTH,
        }
    }
}

/// Resources that exist only while the server is running.
struct RunningServer {
    descriptor: ServiceDescriptor,
    registry: Arc<ConnectionRegistry>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    accept_task: JoinHandle<()>,
    dispatch: DispatchHandle,
    dispatch_task: JoinHandle<()>,
}

/// The server lifecycle object.
pub struct PenServer {
    transport: Arc<dyn Transport>,
    registrar: Arc<dyn DiscoveryRegistrar>,
    dispatcher: Arc<dyn InputDispatcher>,
    settings: ServerSettings,
    events: EventSink,
    running: AtomicBool,
    inner: Mutex<Option<RunningServer>>,
}

impl PenServer {
    /// Creates a stopped server and returns it together with the receiver
    /// for its notifications.
    pub fn new(
        transport: Arc<dyn Transport>,
        registrar: Arc<dyn DiscoveryRegistrar>,
        dispatcher: Arc<dyn InputDispatcher>,
        settings: ServerSettings,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (events, rx) = EventSink::new(settings.event_queue_depth);
        let server = Self {
            transport,
            registrar,
            dispatcher,
            settings,
            events,
            running: AtomicBool::new(false),
            inner: Mutex::new(None),
        };
        (server, rx)
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Current lifecycle state.  Never waits.
    pub fn state(&self) -> ServerState {
        if self.running.load(Ordering::Acquire) {
            ServerState::Running
        } else {
            ServerState::Stopped
        }
    }

    /// Starts the server and returns the assigned port.
    ///
    /// # Errors
    ///
    /// - [`StartError::AlreadyRunning`] if the server is running.
    /// - [`StartError::InvalidIdentifier`] if `identifier` is not a UUID.
    /// - [`StartError::Setup`] if the listening endpoint fails.
    pub async fn start(&self, name: &str, identifier: &str) -> Result<u16, StartError> {
        let mut inner = self.inner.lock().await;
        if inner.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        let identifier = Uuid::parse_str(identifier.trim())
            .map_err(|_| StartError::InvalidIdentifier(identifier.to_string()))?;

        let listener = match self.transport.listen().await {
            Ok(listener) => listener,
            Err(e) => {
                error!("failed to start server: {e}");
                self.events.error(format!("failed to start server: {e}"));
                return Err(e.into());
            }
        };
        let port = listener.local_port();

        let descriptor = ServiceDescriptor {
            name: name.to_string(),
            identifier,
            comment: self.settings.comment.clone(),
            bound_port: port,
            advertised: false,
        };
        let advertised = self.advertise(&descriptor).await;
        let descriptor = descriptor.with_advertised(advertised);

        let registry = Arc::new(ConnectionRegistry::new(self.settings.max_connections));
        let (dispatch, dispatch_task) = spawn_dispatch_worker(
            Arc::clone(&self.dispatcher),
            self.events.clone(),
            self.settings.dispatch_queue_depth,
        );
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        let accept_task = tokio::spawn(run_accept_loop(
            listener,
            AcceptContext {
                session: SessionContext {
                    registry: Arc::clone(&registry),
                    dispatch: dispatch.clone(),
                    events: self.events.clone(),
                    max_line_length: self.settings.max_line_length,
                },
                stop: Arc::clone(&stop),
                wake: Arc::clone(&wake),
                poll_interval: self.settings.accept_poll_interval,
                shutdown_timeout: self.settings.shutdown_timeout,
            },
        ));

        *inner = Some(RunningServer {
            descriptor,
            registry,
            stop,
            wake,
            accept_task,
            dispatch,
            dispatch_task,
        });
        self.running.store(true, Ordering::Release);

        info!("server \"{name}\" ({identifier}) started on port {port}");
        self.events.emit(ServerEvent::ServerStarted { port });
        Ok(port)
    }

    /// Stops the server.  Does nothing if it is already stopped.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        let Some(running) = inner.take() else {
            debug!("stop requested while already stopped");
            return;
        };

        running.stop.store(true, Ordering::Release);
        running.wake.notify_one();

        if running.descriptor.advertised {
            self.withdraw(running.descriptor.identifier).await;
        }

        let connections = running.registry.drain();
        if !connections.is_empty() {
            info!("closing {} connection(s)", connections.len());
        }
        for connection in connections {
            debug!("closing client {} ({})", connection.id, connection.remote_address);
            connection.close();
        }

        if let Err(e) = running.accept_task.await {
            error!("accept loop task failed: {e}");
        }

        drop(running.dispatch);
        let mut dispatch_task = running.dispatch_task;
        match timeout(self.settings.shutdown_timeout, &mut dispatch_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("dispatch worker failed: {e}"),
            Err(_) => {
                warn!("dispatch worker did not drain in time; aborting it");
                dispatch_task.abort();
            }
        }

        self.running.store(false, Ordering::Release);
        info!("server stopped");
        self.events.emit(ServerEvent::ServerStopped);
    }

    /// Closes every connected client but keeps listening.
    ///
    /// Each closed session emits its own `ClientDisconnected`.  Returns how
    /// many connections were closed; `0` when stopped.
    pub async fn disconnect_clients(&self) -> usize {
        let inner = self.inner.lock().await;
        let Some(running) = inner.as_ref() else {
            return 0;
        };
        let connections = running.registry.take_all();
        let count = connections.len();
        for connection in connections {
            debug!("disconnecting client {} ({})", connection.id, connection.remote_address);
            connection.close();
        }
        if count > 0 {
            info!("disconnected {count} client(s)");
        }
        count
    }

    /// Queues `message` (plus a line terminator) to every connected client.
    ///
    /// Returns the number of clients it was queued to; `0` when stopped.
    pub async fn send(&self, message: &str) -> usize {
        let inner = self.inner.lock().await;
        match inner.as_ref() {
            Some(running) => {
                let delivered = running.registry.broadcast(message);
                debug!("queued message to {delivered} client(s)");
                delivered
            }
            None => 0,
        }
    }

    /// The descriptor of the running instance, if any.
    pub async fn descriptor(&self) -> Option<ServiceDescriptor> {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|r| r.descriptor.clone())
    }

    /// Number of registered connections; `0` when stopped.
    pub async fn connection_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .as_ref()
            .map_or(0, |r| r.registry.len())
    }

    /// Ids of the registered connections.
    pub async fn connection_ids(&self) -> Vec<pen_core::ConnectionId> {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|r| r.registry.ids())
            .unwrap_or_default()
    }

    // Registrar calls may block on sockets or threads, so they run on the
    // blocking pool.

    async fn advertise(&self, descriptor: &ServiceDescriptor) -> bool {
        let registrar = Arc::clone(&self.registrar);
        let record = descriptor.clone();
        let result = tokio::task::spawn_blocking(move || registrar.advertise(&record)).await;
        match result {
            Ok(Ok(())) => {
                info!(
                    "advertised \"{}\" ({}) on port {}",
                    descriptor.name, descriptor.identifier, descriptor.bound_port
                );
                true
            }
            Ok(Err(e)) => {
                warn!("service advertisement failed: {e}");
                self.events
                    .warning(format!("service advertisement failed: {e}"));
                false
            }
            Err(e) => {
                warn!("service advertisement task failed: {e}");
                self.events
                    .warning(format!("service advertisement failed: {e}"));
                false
            }
        }
    }

    async fn withdraw(&self, identifier: Uuid) {
        let registrar = Arc::clone(&self.registrar);
        match tokio::task::spawn_blocking(move || registrar.withdraw(identifier)).await {
            Ok(Ok(())) => debug!("advertisement {identifier} withdrawn"),
            Ok(Err(e)) => warn!("failed to withdraw advertisement: {e}"),
            Err(e) => warn!("withdraw task failed: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
