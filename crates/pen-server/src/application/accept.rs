//! Accept loop: waits for connections, registers them, spawns sessions.
//!
//! # Cooperative shutdown
//!
//! Each iteration waits for a connection with a bounded timeout (one second
//! by default).  When the wait times out the loop re-checks the stop flag and
//! goes round again, so a blocked accept can never hold shutdown hostage.
//! `stop` also pokes a [`Notify`] so the loop usually wakes immediately
//! rather than at the end of the current wait.
//!
//! When the loop exits it drops the listener (closing the endpoint) and then
//! waits, up to `shutdown_timeout`, for every session it spawned to finish.
//! A session that is still running after that is aborted.  An aborted or
//! panicked session never reaches its own cleanup, so the loop removes its
//! registry entry and emits its `ClientDisconnected` instead.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use pen_core::{ConnectionId, ServerEvent};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::registry::{ClientConnection, RegistryError};
use crate::application::session::{
    run_session, SessionChannels, SessionContext, SessionEnd, OUTBOUND_QUEUE_DEPTH,
};
use crate::application::transport::{is_fatal_accept_error, Accepted, TransportListener};

/// Pause after a transient accept error so a persistent one (e.g. out of
/// file descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Everything the accept loop needs besides the listener.
#[derive(Debug)]
pub struct AcceptContext {
    pub session: SessionContext,
    pub stop: Arc<AtomicBool>,
    pub wake: Arc<Notify>,
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
}

/// Runs until the stop flag is set or the endpoint fails.
pub async fn run_accept_loop(mut listener: Box<dyn TransportListener>, ctx: AcceptContext) {
    let port = listener.local_port();
    info!("accepting connections on port {port}");
    let mut sessions = Sessions::default();

    loop {
        if ctx.stop.load(Ordering::Acquire) {
            debug!("stop flag set; leaving accept loop");
            break;
        }
        sessions.reap(&ctx);

        let accepted = tokio::select! {
            _ = ctx.wake.notified() => continue,
            result = timeout(ctx.poll_interval, listener.accept()) => result,
        };

        match accepted {
            // Nothing arrived within the poll interval.
            Err(_) => continue,
            Ok(Err(e)) if is_fatal_accept_error(&e) => {
                error!("listening endpoint failed: {e}");
                ctx.session.events.error(format!("listening endpoint failed: {e}"));
                break;
            }
            Ok(Err(e)) => {
                warn!("accept error: {e}");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
            Ok(Ok(accepted)) => admit(accepted, &ctx, &mut sessions),
        }
    }

    drop(listener);
    info!("listening endpoint on port {port} closed");

    let pending = sessions.tasks.len();
    if pending > 0 {
        debug!("waiting for {pending} session(s) to finish");
        let drained = timeout(ctx.shutdown_timeout, sessions.join_all(&ctx)).await;
        if drained.is_err() {
            warn!(
                "{} session(s) did not finish within {:?}; aborting them",
                sessions.tasks.len(),
                ctx.shutdown_timeout
            );
            sessions.tasks.abort_all();
            sessions.join_all(&ctx).await;
        }
    }
}

/// Spawned session tasks and the connection each one serves.
#[derive(Default)]
struct Sessions {
    tasks: JoinSet<SessionEnd>,
    owners: HashMap<task::Id, ConnectionId>,
}

impl Sessions {
    fn spawn<F>(&mut self, id: ConnectionId, session: F)
    where
        F: Future<Output = SessionEnd> + Send + 'static,
    {
        let handle = self.tasks.spawn(session);
        self.owners.insert(handle.id(), id);
    }

    /// Collects sessions that have already finished, without waiting.
    fn reap(&mut self, ctx: &AcceptContext) {
        while let Some(result) = self.tasks.try_join_next_with_id() {
            self.settle(result, ctx);
        }
    }

    /// Waits for every remaining session.
    async fn join_all(&mut self, ctx: &AcceptContext) {
        while let Some(result) = self.tasks.join_next_with_id().await {
            self.settle(result, ctx);
        }
    }

    fn settle(&mut self, result: Result<(task::Id, SessionEnd), JoinError>, ctx: &AcceptContext) {
        match result {
            Ok((task_id, _)) => {
                self.owners.remove(&task_id);
            }
            Err(e) => {
                let Some(id) = self.owners.remove(&e.id()) else {
                    error!("unknown session task failed: {e}");
                    return;
                };
                if e.is_cancelled() {
                    debug!("client {id} session aborted");
                } else {
                    error!("client {id} session task failed: {e}");
                }
                if let Some(conn) = ctx.session.registry.remove(id) {
                    conn.close();
                }
                ctx.session
                    .events
                    .emit(ServerEvent::ClientDisconnected { id });
            }
        }
    }
}

/// Registers one accepted connection and spawns its session.
fn admit(accepted: Accepted, ctx: &AcceptContext, sessions: &mut Sessions) {
    let Accepted {
        stream,
        remote_address,
    } = accepted;
    let id = Uuid::new_v4();
    let (close_tx, close_rx) = oneshot::channel();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let entry = ClientConnection::new(id, remote_address.clone(), close_tx, outbound_tx);

    match ctx.session.registry.insert(entry) {
        Ok(()) => {}
        Err(RegistryError::Closed) => {
            debug!("server stopping; dropping connection from {remote_address}");
            return;
        }
        Err(e) => {
            warn!("refusing connection from {remote_address}: {e}");
            ctx.session
                .events
                .warning(format!("refused connection from {remote_address}: {e}"));
            return;
        }
    }

    info!("client {id} connected from {remote_address}");
    ctx.session.events.emit(ServerEvent::ClientConnected {
        id,
        remote_address,
    });

    sessions.spawn(
        id,
        run_session(
            id,
            stream,
            SessionChannels {
                close_rx,
                outbound_rx,
            },
            ctx.session.clone(),
        ),
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────
